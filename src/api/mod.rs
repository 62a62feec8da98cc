pub mod error;
pub mod health;
pub mod response;
pub mod search;

use crate::external::ProviderClient;

#[derive(Clone)]
pub struct AppState {
    pub provider: ProviderClient,
}
