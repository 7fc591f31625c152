// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Core primitives shared by every FortunaMind service: email-derived
//! identity, the subscription tier catalog, subscription validation with
//! caching, sliding-window rate limiting and the service error taxonomy.
//!
//! This crate performs no I/O of its own. The one external touchpoint is
//! the [`subscription::SubscriptionRegistry`] trait, implemented by the
//! storage layer.

pub mod auth;
pub mod error;
pub mod identity;
pub mod rate_limit;
pub mod subscription;
pub mod tiers;

pub use auth::{AuthContext, UpstreamCredentials};
pub use error::ServiceError;
pub use identity::{Identity, UserHandle};
pub use rate_limit::{RateDecision, RateLimiter};
pub use subscription::{SubscriptionValidator, ValidationResult};
pub use tiers::{Tier, TierLimits};
