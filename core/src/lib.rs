// Copyright (c) 2026 Chimera Contributors
// SPDX-License-Identifier: AGPL-3.0

//! # Chimera Core
//!
//! Autonomous determinism engine for fleets whose desired state is a
//! content-addressed build artifact. The core continuously compares each
//! node's actual artifact fingerprint against the expected one and heals
//! divergence under policy control.
//!
//! # Architecture
//!
//! - **domain** — immutable data model, port contracts, domain services
//! - **application** — deploy/heal/rollback use cases
//! - **infrastructure** — event bus, agent registry, configuration
//! - **presentation** — wire shapes for external surfaces
//!
//! External effectors (build tool, session host, remote transport, cloud
//! inventory, trackers, sinks) are consumed exclusively through the port
//! traits in [`domain::ports`].

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod presentation;
