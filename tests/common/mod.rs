//! Common test infrastructure
//!
//! This module provides all the infrastructure needed for end-to-end tests.
//! Tests should only import from this module, not from internal submodules.
//!
//! # Example
//!
//! ```no_run
//! mod common;
//! use common::{MockVendor, TestClient, TestServer, CUSTOMER_IMAGE_URL, STYLE_IMAGE_URL};
//! use reqwest::StatusCode;
//!
//! #[tokio::test]
//! async fn test_swap() {
//!     let vendor = MockVendor::spawn().await;
//!     let server = TestServer::spawn(&vendor).await;
//!     let client = TestClient::new(server.base_url.clone());
//!
//!     let response = client.face_swap(CUSTOMER_IMAGE_URL, STYLE_IMAGE_URL).await;
//!     assert_eq!(response.status(), StatusCode::OK);
//! }
//! ```

mod client;
mod constants;
mod mock_vendor;
mod server;

// Public API - this is what tests import
#[allow(unused_imports)]
pub use client::TestClient;
pub use constants::*;
#[allow(unused_imports)]
pub use mock_vendor::{poll_empty, poll_status, MockVendor};
#[allow(unused_imports)]
pub use server::TestServer;
