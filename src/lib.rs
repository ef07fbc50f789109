// SPDX-License-Identifier: Apache-2.0
pub mod assets;
pub mod auth;
pub mod config;
pub mod dispatch;
pub mod email;
pub mod error;
pub mod logging;
pub mod middleware;
pub mod otp;
pub mod session;
pub mod shield;
pub mod social;
pub mod store;
