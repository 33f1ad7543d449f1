/// Unwraps `Ok(t)` to `t`, or returns `Some(Err(e))` from the enclosing function.
///
/// Intended for `Iterator<Item = Result<T, E>>::next()` implementations that call
/// fallible helpers.
#[macro_export]
macro_rules! try_or_ret_some_err {
    ($expr:expr) => {
        match $expr {
            Ok(value) => value,
            Err(err) => {
                return Some(Err(err));
            }
        }
    };
}
