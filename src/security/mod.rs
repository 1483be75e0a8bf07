//! Request security: trusted domains, the gatekeeper chain and the origin
//! gate built on top of both.

pub mod chain;
pub mod domain;
pub mod origin;

pub use chain::{Gatekeeper, Handler, SecurityChain};
pub use domain::{Domain, DomainParseError};
pub use origin::{matched_domain, MatchedDomain, OriginSecurity, REJECTION_BODY};
