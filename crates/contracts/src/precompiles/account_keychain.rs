pub use IAccountKeychain::{
    IAccountKeychainErrors as AccountKeychainError, IAccountKeychainEvents as AccountKeychainEvent,
};

crate::sol! {
    /// Account Keychain interface for managing access keys.
    ///
    /// An account's root key authorizes secondary keys, each with:
    /// - a signature type (secp256k1, P256, WebAuthn)
    /// - an expiry timestamp (0 = never expires)
    /// - optional per-token spending limits
    ///
    /// Only the root key can authorize or revoke keys. Access keys sign regular
    /// transactions and the precompile enforces their spending limits.
    #[derive(Debug, PartialEq, Eq)]
    #[sol(abi)]
    interface IAccountKeychain {
        enum SignatureType {
            Secp256k1,
            P256,
            WebAuthn,
        }

        struct TokenLimit {
            address token;
            uint256 amount;
        }

        struct KeyInfo {
            SignatureType signatureType;
            address keyId;
            uint64 expiry;
            bool enforceLimits;
            bool isRevoked;
        }

        /// Emitted when a new key is authorized
        event KeyAuthorized(address indexed account, address indexed publicKey, uint8 signatureType, uint64 expiry);

        /// Emitted when a key is revoked
        event KeyRevoked(address indexed account, address indexed publicKey);

        /// Emitted when a spending limit is set or updated.
        ///
        /// The key field is `publicKey` on the deployed precompile even though the
        /// call arguments name it `keyId`; both carry the access key address.
        event SpendingLimitUpdated(address indexed account, address indexed publicKey, address indexed token, uint256 newLimit);

        function authorizeKey(
            address keyId,
            SignatureType signatureType,
            uint64 expiry,
            bool enforceLimits,
            TokenLimit[] calldata limits
        ) external;

        function revokeKey(address keyId) external;

        function updateSpendingLimit(
            address keyId,
            address token,
            uint256 newLimit
        ) external;

        function getKey(address account, address keyId) external view returns (KeyInfo memory);

        /// Remaining spending amount for a key-token pair.
        function getRemainingLimit(
            address account,
            address keyId,
            address token
        ) external view returns (uint256);

        function getTransactionKey() external view returns (address);

        error UnauthorizedCaller();
        error KeyAlreadyExists();
        error KeyNotFound();
        error KeyExpired();
        error SpendingLimitExceeded();
        error InvalidSignatureType();
        error ZeroPublicKey();
        error ExpiryInPast();
        error KeyAlreadyRevoked();
        error SignatureTypeMismatch(uint8 expected, uint8 actual);
    }
}

crate::sol! {
    /// Pre-`getRemainingLimit` read shape, still served by older deployments.
    #[derive(Debug, PartialEq, Eq)]
    interface IAccountKeychainLegacy {
        function spendingLimit(
            address account,
            address keyId,
            address token
        ) external view returns (uint256);
    }
}

impl AccountKeychainError {
    /// Returns a short, user-facing description of a keychain revert.
    pub fn describe(&self) -> &'static str {
        match self {
            Self::UnauthorizedCaller(_) => "caller is not the account's root key",
            Self::KeyAlreadyExists(_) => "access key is already authorized",
            Self::KeyNotFound(_) => "access key is not authorized for this account",
            Self::KeyExpired(_) => "access key has expired",
            Self::SpendingLimitExceeded(_) => "spending limit exceeded",
            Self::InvalidSignatureType(_) => "invalid signature type",
            Self::ZeroPublicKey(_) => "access key address is zero",
            Self::ExpiryInPast(_) => "expiry is in the past",
            Self::KeyAlreadyRevoked(_) => "access key was revoked and cannot be reused",
            Self::SignatureTypeMismatch(_) => "signature type does not match the authorized key",
        }
    }
}
