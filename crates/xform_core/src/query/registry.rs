//! Name to builder lookup for verbs and functions.
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::{Arc, LazyLock};

use xform_error::{DbError, Result};

use super::BuildContext;
use super::parser::QueryParser;
use super::verbs::BUILTIN_VERBS;
use crate::execution::column::Column;
use crate::execution::table::BoxedTable;
use crate::functions::builtins::BUILTIN_FUNCTIONS;
use crate::functions::{FunctionArg, FunctionBuilder, FunctionContext};

/// Builds the operator for one line of a query.
pub trait VerbBuilder: Debug + Send + Sync {
    /// Verb the builder is invoked by, lowercase.
    fn verb(&self) -> &'static str;

    fn usage(&self) -> &'static str;

    /// Build the operator, consuming exactly the verb's arguments from the
    /// parser.
    ///
    /// `source` is None for the first verb of a query.
    fn build(
        &self,
        source: Option<BoxedTable>,
        parser: &mut QueryParser,
        ctx: &BuildContext,
    ) -> Result<BoxedTable>;
}

static VERBS: LazyLock<HashMap<String, &'static dyn VerbBuilder>> = LazyLock::new(|| {
    let mut map = HashMap::new();
    for builder in BUILTIN_VERBS {
        insert_unique(&mut map, builder.verb(), *builder);
    }
    map
});

static FUNCTIONS: LazyLock<HashMap<String, &'static dyn FunctionBuilder>> = LazyLock::new(|| {
    let mut map = HashMap::new();
    for builder in BUILTIN_FUNCTIONS {
        insert_unique(&mut map, builder.name(), *builder);
    }
    map
});

fn insert_unique<B: ?Sized>(map: &mut HashMap<String, &'static B>, name: &str, builder: &'static B) {
    if map.insert(name.to_ascii_lowercase(), builder).is_some() {
        panic!("Duplicate builder name: {name}");
    }
}

fn sorted_names<B: ?Sized>(map: &HashMap<String, &'static B>, name: impl Fn(&B) -> &'static str) -> Vec<&'static str> {
    let mut names: Vec<_> = map.values().map(|b| name(*b)).collect();
    names.sort_unstable();
    names
}

/// Look up a verb, case-insensitively.
pub fn verb(name: &str) -> Result<&'static dyn VerbBuilder> {
    VERBS.get(&name.to_ascii_lowercase()).copied().ok_or_else(|| {
        DbError::usage(format!("Unknown verb '{name}'"))
            .with_field("available", verb_names().join(", "))
    })
}

pub fn verb_names() -> Vec<&'static str> {
    sorted_names(&VERBS, |b| b.verb())
}

/// Look up a function, case-insensitively.
pub fn function(name: &str) -> Result<&'static dyn FunctionBuilder> {
    FUNCTIONS.get(&name.to_ascii_lowercase()).copied().ok_or_else(|| {
        DbError::usage(format!("Unknown function '{name}'"))
            .with_field("available", function_names().join(", "))
    })
}

pub fn function_names() -> Vec<&'static str> {
    sorted_names(&FUNCTIONS, |b| b.name())
}

/// Build a function column, checking the argument count first.
pub fn build_function(
    name: &str,
    args: Vec<FunctionArg>,
    ctx: &FunctionContext,
) -> Result<Arc<dyn Column>> {
    let builder = function(name)?;
    let expected = builder.arg_count();
    if !expected.contains(&args.len()) {
        return Err(DbError::usage(format!(
            "{} takes {} arguments, got {}",
            builder.name(),
            format_range(&expected),
            args.len()
        ))
        .with_field("usage", builder.usage()));
    }

    builder.build(args, ctx).map_err(|e| {
        if e.is_usage() && e.get_field("usage").is_none() {
            e.with_field("usage", builder.usage())
        } else {
            e
        }
    })
}

fn format_range(range: &std::ops::RangeInclusive<usize>) -> String {
    if range.start() == range.end() {
        range.start().to_string()
    } else {
        format!("{} to {}", range.start(), range.end())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::table::RowCount;

    #[test]
    fn lookup_case_insensitive() {
        assert_eq!("where", verb("WHERE").unwrap().verb());
        assert_eq!("Coalesce", function("coalesce").unwrap().name());
    }

    #[test]
    fn unknown_verb_lists_available() {
        let err = verb("join").unwrap_err();
        assert!(err.is_usage());
        let available = err.get_field("available").unwrap();
        assert!(available.contains("removecolumns"));
        assert!(available.contains("where"));
    }

    #[test]
    fn registries_have_no_duplicates() {
        assert_eq!(BUILTIN_VERBS.len(), verb_names().len());
        assert_eq!(BUILTIN_FUNCTIONS.len(), function_names().len());
    }

    #[test]
    fn wrong_function_arg_count() {
        let ctx = FunctionContext {
            row_count: RowCount::default(),
            as_of: 0,
            available: Vec::new(),
        };
        let err = build_function("IsNull", Vec::new(), &ctx).unwrap_err();
        assert!(err.is_usage());
        assert_eq!(Some("IsNull({Col|Func})"), err.get_field("usage"));
    }
}
