//! Domain types: clients, scopes, protocol constants and authorization
//! parameters.

pub mod authorization;
pub mod client;
pub mod scope;

pub use authorization::{
    AuthorizationDetail, AuthorizationParameters, ClaimInfo, ClaimsObject, DisplayValue, Prompt,
};
pub use client::{
    AuthMethod, Client, ClientMetaInfo, CodeChallengeMethod, GrantType, ResponseMode, ResponseType,
    SubjectType,
};
pub use scope::Scope;
