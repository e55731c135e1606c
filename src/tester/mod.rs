mod client;

pub use client::{RequestTester, TestOutcome, TestRequest};
