mod crawler_tests;
pub mod support;
