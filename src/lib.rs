//! # focusdeck-mobile
//!
//! Session core for the Focusdeck mobile client: the authoritative in-memory
//! session state, the async operations that mutate it (sign-in, sign-up,
//! sign-out, bootstrap), and the route guards that read it.
//!
//! Screens, theming, translations, and form widgets live in the app shell and
//! consume this crate; the identity backend and the router are reached only
//! through the [`net::identity::IdentityGateway`] and
//! [`routes::navigator::Navigator`] traits.

pub mod net;
pub mod routes;
pub mod services;
pub mod state;
