mod helpers;
mod options_tests;
