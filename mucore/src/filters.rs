//! Filters deciding which functions and mutation points are worth mutating.
use muinstr::modules::{Function, Module};

use crate::{magic::RESERVED_PREFIX, mutant::MutationPoint, utils::conf::Configuration};

/// Predicate over functions, checked before searching for points.
pub trait FunctionFilter: Send + Sync {
    fn name(&self) -> &'static str;

    fn should_skip_function(&self, function: &Function, module: &Module) -> bool;
}

/// Predicate over candidate mutation points.
pub trait MutationFilter: Send + Sync {
    fn name(&self) -> &'static str;

    fn should_skip_point(&self, point: &MutationPoint) -> bool;
}

/// Source file of a function: its own location, else the module source.
pub fn function_file<'a>(function: &'a Function, module: &'a Module) -> Option<&'a str> {
    function
        .loc
        .as_ref()
        .map(|loc| loc.file.as_str())
        .or(module.source.as_deref())
}

/// Skips code without debug information.
#[derive(Debug, Default)]
pub struct NoDebugInfoFilter;

impl FunctionFilter for NoDebugInfoFilter {
    fn name(&self) -> &'static str {
        "no debug info"
    }

    fn should_skip_function(&self, function: &Function, _module: &Module) -> bool {
        function.loc.is_none()
    }
}

impl MutationFilter for NoDebugInfoFilter {
    fn name(&self) -> &'static str {
        "no debug info"
    }

    fn should_skip_point(&self, point: &MutationPoint) -> bool {
        point.source_location().is_null()
    }
}

/// Include/exclude filter on source paths. A path matches a pattern when it
/// contains it. Excludes win over includes; an empty include list accepts
/// every path.
#[derive(Debug, Default)]
pub struct FilePathFilter {
    include: Vec<String>,
    exclude: Vec<String>,
}

impl FilePathFilter {
    pub fn new(include: Vec<String>, exclude: Vec<String>) -> Self {
        Self { include, exclude }
    }

    pub fn is_empty(&self) -> bool {
        self.include.is_empty() && self.exclude.is_empty()
    }

    pub fn should_skip_path(&self, path: &str) -> bool {
        if self.exclude.iter().any(|p| path.contains(p.as_str())) {
            return true;
        }
        !self.include.is_empty() && !self.include.iter().any(|p| path.contains(p.as_str()))
    }
}

impl FunctionFilter for FilePathFilter {
    fn name(&self) -> &'static str {
        "file path"
    }

    fn should_skip_function(&self, function: &Function, module: &Module) -> bool {
        match function_file(function, module) {
            Some(path) => self.should_skip_path(path),
            None => !self.include.is_empty(),
        }
    }
}

impl MutationFilter for FilePathFilter {
    fn name(&self) -> &'static str {
        "file path"
    }

    fn should_skip_point(&self, point: &MutationPoint) -> bool {
        self.should_skip_path(&point.source_location().file)
    }
}

/// The ordered filter chain.
#[derive(Default)]
pub struct Filters {
    pub function_filters: Vec<Box<dyn FunctionFilter>>,
    pub mutation_filters: Vec<Box<dyn MutationFilter>>,
}

impl Filters {
    pub fn from_configuration(config: &Configuration) -> Self {
        let mut filters = Filters::default();
        if config.debug_info_filter {
            filters.function_filters.push(Box::new(NoDebugInfoFilter));
            filters.mutation_filters.push(Box::new(NoDebugInfoFilter));
        }

        let paths = || {
            FilePathFilter::new(config.include_paths.clone(), config.exclude_paths.clone())
        };
        if !paths().is_empty() {
            filters.function_filters.push(Box::new(paths()));
            filters.mutation_filters.push(Box::new(paths()));
        }
        filters
    }

    /// Functions generated by the pipeline are never mutated.
    pub fn skip_function(&self, function: &Function, module: &Module) -> bool {
        function.is_declaration()
            || function.name.starts_with(RESERVED_PREFIX)
            || self
                .function_filters
                .iter()
                .any(|f| f.should_skip_function(function, module))
    }

    pub fn skip_point(&self, point: &MutationPoint) -> bool {
        self.mutation_filters
            .iter()
            .any(|f| f.should_skip_point(point))
    }
}

#[cfg(test)]
mod tests {
    use muinstr::modules::parser::parse_module;

    use super::*;

    const MODULE: &str = r#"
module "src/app/main.c"
define void @located() !loc("src/lib/util.c", 1, 1) {
entry:
    ret void
}
define void @bare() {
entry:
    ret void
}
define void @_mu_original_located() {
entry:
    ret void
}
"#;

    #[test]
    fn path_filter_excludes_win() {
        let filter = FilePathFilter::new(vec!["src/".into()], vec!["src/lib".into()]);
        assert!(filter.should_skip_path("src/lib/util.c"));
        assert!(!filter.should_skip_path("src/app/main.c"));
        assert!(filter.should_skip_path("vendor/x.c"));
        assert!(!FilePathFilter::default().should_skip_path("anything"));
    }

    #[test]
    fn chain_from_configuration() {
        let module = parse_module(MODULE).unwrap();
        let config = Configuration {
            exclude_paths: vec!["lib/".into()],
            ..Default::default()
        };
        let filters = Filters::from_configuration(&config);
        assert_eq!(filters.function_filters.len(), 2);

        // Excluded by path
        assert!(filters.skip_function(&module.functions["located"], &module));
        // No debug info
        assert!(filters.skip_function(&module.functions["bare"], &module));

        let permissive = Filters::from_configuration(&Configuration {
            debug_info_filter: false,
            ..Default::default()
        });
        assert!(!permissive.skip_function(&module.functions["bare"], &module));
        assert!(permissive.skip_function(&module.functions["_mu_original_located"], &module));
    }
}
