pub mod principal;

pub use principal::{CurrentPrincipal, AUTH_COOKIE};
