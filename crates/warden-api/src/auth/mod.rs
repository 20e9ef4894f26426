//! Authentication and authorization of API requests.

pub mod authorize;
pub mod basic;
pub mod compare;
pub mod credentials;

pub use authorize::{
    authorize, authorize_admin, authorize_state_inspection, Authorization, AuthorizationError,
};
pub use basic::{parse_basic_auth_header, BasicCredentials};
pub use compare::constant_time_compare;
pub use credentials::{read_peer_credentials, LocalTrustPolicy, PeerCredentials, PeerCredentialsError};
