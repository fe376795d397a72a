mod controller_tests;
mod fakes;
