mod helpers;

mod recovery_tests;
mod write_tests;
