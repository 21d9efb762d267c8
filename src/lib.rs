//! reitti — progressive-delivery traffic splitting on Contour HTTPProxy.
//!
//! Given a [`crd::canary::Canary`] rollout intent, a [`router::Router`]
//! keeps the apex routing resource structurally in sync and exposes the
//! primary/canary weight split to the rollout control loop. Pacing, health
//! evaluation and retry scheduling belong to that loop, not to this crate.

pub mod crd;
pub mod router;
