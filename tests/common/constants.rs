//! Shared constants for end-to-end tests
//!
//! When mock vendor data or test timings change, update only this file.

// ============================================================================
// Mock Vendor Credentials
// ============================================================================

/// Client id accepted by the mock vendor
pub const MOCK_CLIENT_ID: &str = "test-client-id";

/// Client secret accepted by the mock vendor
pub const MOCK_CLIENT_SECRET: &str = "test-client-secret";

/// Prefix of every token minted by the mock vendor
pub const MOCK_TOKEN_PREFIX: &str = "mock-token-";

// ============================================================================
// Mock Vendor Data
// ============================================================================

/// Landmarks returned for every detected face
pub const MOCK_LANDMARKS: &str = "100,120:140,120:120,150:105,170:135,170";

pub const MOCK_JOB_ID: &str = "mock-job-1";

pub const MOCK_RESULT_ID: &str = "mock-result-1";

/// Output image of a successful job unless a test scripts another one
pub const OUTPUT_IMAGE_URL: &str = "https://cdn.example.com/results/out.jpg";

// ============================================================================
// Request Data
// ============================================================================

pub const CUSTOMER_IMAGE_URL: &str = "https://img.example.com/customer.jpg";

pub const STYLE_IMAGE_URL: &str = "https://img.example.com/styles/bob.jpg";

pub const TEST_USER_ID: &str = "user-42";

pub const TEST_STYLE_ID: &str = "bob-cut";

pub const TEST_STYLE_NAME: &str = "Bob Cut";

/// 1x1 transparent PNG
pub const TINY_PNG_DATA_URL: &str = "data:image/png;base64,iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNkYPhfDwAChwGA60e6kgAAAABJRU5ErkJggg==";

/// Valid base64 that decodes to text, not an image
pub const NOT_AN_IMAGE_DATA_URL: &str = "data:image/png;base64,aGVsbG8gd29ybGQ=";

// ============================================================================
// Timing
// ============================================================================

/// Maximum time to wait for a server to become ready (milliseconds)
pub const SERVER_READY_TIMEOUT_MS: u64 = 5000;

/// Interval between readiness checks (milliseconds)
pub const SERVER_READY_POLL_INTERVAL_MS: u64 = 20;

/// Request timeout for the test client (seconds)
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Interval between status checks of the server under test (milliseconds)
pub const TEST_POLL_INTERVAL_MS: u64 = 20;

/// Status checks allowed per swap on the server under test
pub const TEST_MAX_POLL_ATTEMPTS: u32 = 3;

/// Maximum time to wait for a background write to show up (milliseconds)
pub const STORE_WRITE_TIMEOUT_MS: u64 = 2000;
