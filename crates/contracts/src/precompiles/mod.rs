pub mod account_keychain;
pub mod tip20;

pub use account_keychain::*;
use alloy_primitives::{Address, address};
pub use tip20::{ITIP20, TIP20Error, TIP20Event};

pub const PATH_USD_ADDRESS: Address = address!("0x20C0000000000000000000000000000000000000");
pub const DEFAULT_FEE_TOKEN: Address = PATH_USD_ADDRESS;
pub const ACCOUNT_KEYCHAIN_ADDRESS: Address =
    address!("0xAAAAAAAA00000000000000000000000000000000");
