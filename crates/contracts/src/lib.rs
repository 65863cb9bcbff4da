//! Tempo precompile bindings used by access-key tooling.

#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![cfg_attr(docsrs, feature(doc_cfg))]

/// Helper macro to allow feature-gating rpc implementations behind the `rpc` feature.
macro_rules! sol {
    ($($input:tt)*) => {
        #[cfg(feature = "rpc")]
        alloy_sol_types::sol! {
            #[sol(rpc)]
            $($input)*
        }
        #[cfg(not(feature = "rpc"))]
        alloy_sol_types::sol! {
            $($input)*
        }
    };
}

pub(crate) use sol;

pub mod precompiles;
