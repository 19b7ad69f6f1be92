mod support;

mod diff_tests;
mod hooks_tests;
