pub use ITIP20::{ITIP20Errors as TIP20Error, ITIP20Events as TIP20Event};

crate::sol! {
    /// The subset of the TIP20 token interface exercised by access keys.
    ///
    /// Transfers made by an access key count against the key's spending limit
    /// for the token; `balanceOf` is used as a side-effect free call when a
    /// transaction only exists to carry a key authorization.
    #[derive(Debug, PartialEq, Eq)]
    #[sol(abi)]
    interface ITIP20 {
        function decimals() external view returns (uint8);
        function balanceOf(address account) external view returns (uint256);
        function transfer(address to, uint256 amount) external returns (bool);
        function transferWithMemo(address to, uint256 amount, bytes32 memo) external;

        event Transfer(address indexed from, address indexed to, uint256 amount);

        error InsufficientBalance(uint256 available, uint256 required, address token);
        error PolicyForbids();
    }
}
