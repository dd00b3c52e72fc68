//! Itanium C++ symbol demangling for `c++filt` and `nm -C`.

use std::borrow::Cow;

use cpp_demangle::{DemangleOptions, Symbol};

/// Names longer than this are passed through untouched.
pub const MAX_MANGLED_LEN: usize = 10_000;

/// Demangles `name`, or returns it unchanged when it is not a valid
/// mangled name. A doubled leading underscore (`__Z...`) is accepted.
pub fn demangle(name: &str) -> Cow<'_, str> {
    if name.len() > MAX_MANGLED_LEN {
        return Cow::Borrowed(name);
    }
    let mangled = match name.strip_prefix('_') {
        Some(rest) if rest.starts_with("_Z") => rest,
        _ => name,
    };
    if !mangled.starts_with("_Z") {
        return Cow::Borrowed(name);
    }
    match Symbol::new(mangled).map(|sym| sym.demangle(&DemangleOptions::default())) {
        Ok(Ok(plain)) if !plain.is_empty() => Cow::Owned(plain),
        _ => {
            log::debug!("not a mangled name: {name}");
            Cow::Borrowed(name)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn functions_and_members() {
        assert_eq!(demangle("_Z4testv"), "test()");
        assert_eq!(demangle("_ZN5Class6methodEv"), "Class::method()");
        assert_eq!(demangle("__ZN5Class6methodEv"), "Class::method()");
    }

    #[test]
    fn plain_names_pass_through() {
        assert_eq!(demangle("normal_symbol"), "normal_symbol");
        assert_eq!(demangle("main"), "main");
        assert_eq!(demangle("_Zbogus"), "_Zbogus");
        assert_eq!(demangle(""), "");
    }

    #[test]
    fn oversized_input_is_untouched() {
        let long = format!("_ZN{}", "9abcdefghi".repeat(1_100));
        assert!(matches!(demangle(&long), Cow::Borrowed(_)));
    }

    proptest! {
        #[test]
        fn never_empties_a_name(name in "_{0,2}Z?[A-Za-z0-9_]{1,40}") {
            prop_assert!(!demangle(&name).is_empty());
        }
    }
}
