//! Utility macros for common patterns across the crate

/// Implement Debug for a type containing a PgPool field
///
/// PgPool doesn't implement Debug, so we show it as the string "PgPool" instead.
///
/// # Examples
///
/// ```ignore
/// use sqlx::PgPool;
///
/// pub struct MyBroker {
///     pool: PgPool,
///     name: String,
/// }
///
/// debug_with_pgpool!(MyBroker { pool: PgPool, name });
/// ```
#[cfg(feature = "postgres")]
macro_rules! debug_with_pgpool {
    ($struct_name:ident { $pool_field:ident: PgPool $(, $field:ident)* $(,)? }) => {
        impl std::fmt::Debug for $struct_name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.debug_struct(stringify!($struct_name))
                    .field(stringify!($pool_field), &"PgPool")
                    $(
                        .field(stringify!($field), &self.$field)
                    )*
                    .finish()
            }
        }
    };
}

#[cfg(feature = "postgres")]
pub(crate) use debug_with_pgpool;

/// Build positional [`Args`](crate::backend::Args) from JSON values
///
/// Each argument is a single token tree handed to `serde_json::json!`: a
/// literal, an identifier, or a bracketed/braced JSON value.
///
/// ```rust
/// use dualwrite::args;
///
/// let args = args!["fruit", {"color": "yellow"}];
/// assert_eq!(args.len(), 2);
/// assert!(args![].is_empty());
/// ```
#[macro_export]
macro_rules! args {
    () => {
        ::std::vec::Vec::<$crate::__private::serde_json::Value>::new()
    };
    ($($arg:tt),+ $(,)?) => {
        vec![$($crate::__private::serde_json::json!($arg)),+]
    };
}
