// src/debug/printers.rs

//! Printer macros and helpers for reporting problems on stderr, and for
//! rendering raw bytes readably in debug and test output.

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// `d`ebug `e`println! an `err`or
#[macro_export]
macro_rules! de_err {
    (
        $($args:tt)*
    ) => {
        {
            #[cfg(any(debug_assertions,test))]
            eprint!("ERROR: ");
            #[cfg(any(debug_assertions,test))]
            eprintln!($($args)*)
        }
    }
}
pub use de_err;

/// `d`ebug `e`println! an `warn`ing
#[macro_export]
macro_rules! de_wrn {
    (
        $($args:tt)*
    ) => {
        {
            #[cfg(any(debug_assertions,test))]
            eprint!("WARNING: ");
            #[cfg(any(debug_assertions,test))]
            eprintln!($($args)*)
        }
    }
}
pub use de_wrn;

/// `e`println! an `err`or
#[macro_export]
macro_rules! e_err {
    (
        $($args:tt)*
    ) => {
        {
            eprint!("ERROR: ");
            eprintln!($($args)*)
        }
    }
}
pub use e_err;

/// `e`println! a `warn`ing
#[macro_export]
macro_rules! e_wrn {
    (
        $($args:tt)*
    ) => {
        {
            eprint!("WARNING: ");
            eprintln!($($args)*)
        }
    }
}
pub use e_wrn;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// helper functions - visible control characters
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Replace a C0 control character (and DEL) with its Unicode "Control
/// Pictures" symbol, e.g. `'\n'` becomes `'␊'`. Other chars are returned
/// unchanged.
///
/// Unlike `fmt::Debug` escaping, the printed width stays one column, which
/// keeps byte offsets in trace output lined up.
pub const fn char_to_char_noraw(c: char) -> char {
    match c as u32 {
        // U+2400 "SYMBOL FOR NULL" begins the Control Pictures block
        val @ 0..=31 => match char::from_u32(0x2400 + val) {
            Some(pic) => pic,
            None => c,
        },
        127 => '␡',
        _ => c,
    }
}

/// transform a buffer of (presumably) UTF-8 bytes to a non-raw String;
/// invalid sequences become `U+FFFD`
///
/// only intended for debugging
#[doc(hidden)]
#[allow(non_snake_case)]
pub fn buffer_to_String_noraw(buffer: &[u8]) -> String {
    str_to_String_noraw(&String::from_utf8_lossy(buffer))
}

/// transform valid UTF8 str to non-raw String version
///
/// only intended for debugging
#[doc(hidden)]
#[allow(non_snake_case)]
pub fn str_to_String_noraw(str_buf: &str) -> String {
    str_buf
        .chars()
        .map(char_to_char_noraw)
        .collect()
}
