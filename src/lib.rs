//! In-process mock SQL driver for tests: register stubs pairing query
//! conditions with canned responses, then point the code under test at a
//! [`Mock`] instead of a real connection.

#[macro_export]
macro_rules! reexport {
    ($module:ident) => {
        $crate::reexport!($module, false);
    };
    ($module:ident, test) => {
        $crate::reexport!($module, true);
    };
    ($module:ident, $is_test:literal) => {
        #[cfg_attr($is_test, cfg(test))]
        mod $module;
        #[cfg_attr($is_test, cfg(test))]
        #[allow(unused_imports)]
        #[allow(ambiguous_glob_reexports)]
        pub use $module::*;
    };
}

/// Builds a `Vec<Value>` from a comma-separated list of convertible
/// expressions; `params![]` yields an empty argument list.
#[macro_export]
macro_rules! params {
    () => {
        ::std::vec::Vec::<$crate::Value>::new()
    };
    ($($v:expr),+ $(,)?) => {
        ::std::vec![$($crate::Value::from($v)),+]
    };
}

reexport!(testing, test);
reexport!(error);
reexport!(config);
reexport!(value);
reexport!(rows);
reexport!(input);
reexport!(cond);
reexport!(stub);
reexport!(registry);
#[allow(unused_imports)]
pub(crate) use tracing::{debug, error, info, span, trace, warn};
