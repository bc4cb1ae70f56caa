mod merchant_auth;

pub use merchant_auth::*;
