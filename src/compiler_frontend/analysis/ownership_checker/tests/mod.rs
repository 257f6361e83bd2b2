
mod ownership_checker_call_tests;
mod ownership_checker_drop_tests;
mod ownership_checker_origin_tests;
mod ownership_checker_property_tests;
