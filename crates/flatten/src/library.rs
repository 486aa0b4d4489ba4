//! Recognized standard library routines.
//!
//! A function that looks like a C library routine must never be force-inlined:
//! the host expects to keep calling the real implementation. A built-in entry
//! matches on name and signature shape (parameter count and variadic flag),
//! so a module-defined helper that merely reuses a libc name with a different
//! shape is not mistaken for the library routine. Routines added through
//! configuration match on name alone.

use rustc_hash::{FxHashMap, FxHashSet};
use squishy_ir::Function;

/// Signature shape of a library routine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoutineShape {
    pub params: usize,
    pub var_arg: bool,
}

const fn fixed(params: usize) -> RoutineShape {
    RoutineShape {
        params,
        var_arg: false,
    }
}

const fn variadic(params: usize) -> RoutineShape {
    RoutineShape {
        params,
        var_arg: true,
    }
}

/// The C standard library routines known by default
const STANDARD_ROUTINES: &[(&str, RoutineShape)] = &[
    // <string.h>
    ("memcpy", fixed(3)),
    ("memmove", fixed(3)),
    ("memset", fixed(3)),
    ("memcmp", fixed(3)),
    ("memchr", fixed(3)),
    ("strcpy", fixed(2)),
    ("strncpy", fixed(3)),
    ("strcat", fixed(2)),
    ("strncat", fixed(3)),
    ("strcmp", fixed(2)),
    ("strncmp", fixed(3)),
    ("strlen", fixed(1)),
    ("strnlen", fixed(2)),
    ("strchr", fixed(2)),
    ("strrchr", fixed(2)),
    ("strstr", fixed(2)),
    ("strdup", fixed(1)),
    // <stdio.h>
    ("printf", variadic(1)),
    ("fprintf", variadic(2)),
    ("sprintf", variadic(2)),
    ("snprintf", variadic(3)),
    ("scanf", variadic(1)),
    ("sscanf", variadic(2)),
    ("puts", fixed(1)),
    ("putchar", fixed(1)),
    ("getchar", fixed(0)),
    ("fputs", fixed(2)),
    ("fputc", fixed(2)),
    ("fopen", fixed(2)),
    ("fclose", fixed(1)),
    ("fread", fixed(4)),
    ("fwrite", fixed(4)),
    // <stdlib.h>
    ("malloc", fixed(1)),
    ("calloc", fixed(2)),
    ("realloc", fixed(2)),
    ("free", fixed(1)),
    ("exit", fixed(1)),
    ("abort", fixed(0)),
    ("atoi", fixed(1)),
    ("atol", fixed(1)),
    ("strtol", fixed(3)),
    ("strtoul", fixed(3)),
    ("abs", fixed(1)),
    ("qsort", fixed(4)),
    ("rand", fixed(0)),
    ("srand", fixed(1)),
];

/// Lookup table of routines that must not be force-inlined
#[derive(Debug, Clone, Default)]
pub struct LibraryTable {
    shapes: FxHashMap<String, RoutineShape>,
    by_name: FxHashSet<String>,
}

impl LibraryTable {
    /// A table holding the C standard library routines
    pub fn standard() -> Self {
        Self {
            shapes: STANDARD_ROUTINES
                .iter()
                .map(|(name, shape)| ((*name).to_string(), *shape))
                .collect(),
            by_name: FxHashSet::default(),
        }
    }

    /// An empty table
    pub fn empty() -> Self {
        Self::default()
    }

    /// Adds a routine recognized by name alone
    pub fn with_routine(mut self, name: impl Into<String>) -> Self {
        self.by_name.insert(name.into());
        self
    }

    /// Returns true if `function` is a recognized library routine
    pub fn matches(&self, function: &Function) -> bool {
        if self.by_name.contains(&function.name) {
            return true;
        }
        self.shapes.get(&function.name).is_some_and(|shape| {
            shape.params == function.parameters.len() && shape.var_arg == function.is_var_arg
        })
    }

    /// Number of routines in the table
    pub fn len(&self) -> usize {
        self.shapes.len() + self.by_name.iter().filter(|n| !self.shapes.contains_key(*n)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use squishy_ir::Type;

    fn definition(name: &str, params: usize) -> Function {
        let mut function = Function::new(name, Type::Ptr);
        for _ in 0..params {
            function.add_parameter(Type::Ptr, None);
        }
        function
    }

    #[test]
    fn test_matches_name_and_shape() {
        let table = LibraryTable::standard();

        assert!(table.matches(&definition("memcpy", 3)));
        assert!(!table.matches(&definition("memcpy", 2)));
        assert!(!table.matches(&definition("_strcpy", 2)));
        assert!(table.matches(&Function::declaration(
            "printf",
            Type::i32(),
            vec![Type::Ptr],
            true
        )));
    }

    #[test]
    fn test_extra_routines_match_by_name() {
        let table = LibraryTable::empty().with_routine("my_alloc");

        assert!(table.matches(&definition("my_alloc", 7)));
        assert!(!table.matches(&definition("memcpy", 3)));
        assert_eq!(table.len(), 1);
    }
}
