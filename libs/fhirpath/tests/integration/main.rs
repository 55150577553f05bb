//! Integration tests: expression trees evaluated over fixture resources with
//! real collaborators.

#[path = "../test_support/mod.rs"]
mod test_support;

mod conforms_to;
mod external_constants;
mod functions;
mod member_of;
mod resolve;
mod terminology;
