mod token_cache;

pub use token_cache::{AuthError, Credential, TokenCache, TokenMinter};

#[cfg(test)]
pub(crate) use token_cache::tests::CountingMinter;
