/// Authentication module
///
/// Password hashing, JWT issuance/validation, the token blocklist,
/// the per-request authenticator and the role gate.

mod authenticator;
mod claims;
mod gate;
mod jwt;
mod password;
mod revocation;

pub use authenticator::{parse_bearer, RequiredMode, TokenAuthenticator, TokenPair};
pub use claims::{Claims, Subject, TokenKind};
pub use gate::RoleGate;
pub use jwt::{InvalidToken, TokenCodec};
pub use password::CredentialHasher;
pub use revocation::{InMemoryRevocationStore, RedisRevocationStore, RevocationStore};
