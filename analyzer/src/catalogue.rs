//! Type and method catalogue
//!
//! Knows which types are handles, which ORM methods hand back a fresh handle
//! and which chain methods finish a query. Everything here is derived from
//! the configuration once and never changes afterwards.

use fxhash::FxHashSet;

use crate::config::AnalyzerConfig;
use crate::ssa::{FunctionRef, TypeId, TypeKind, TypeTable};

#[derive(Debug, Clone)]
pub struct Catalogue {
    orm_path: String,
    /// Last path segment of `orm_path`, the default import name
    orm_name: String,
    handle_type: String,
    session_method: String,
    session_type: String,
    immutable: FxHashSet<String>,
    finishers: FxHashSet<String>,
}

impl Catalogue {
    pub fn new(config: &AnalyzerConfig) -> Self {
        let orm_name = config
            .orm_path
            .rsplit('/')
            .next()
            .unwrap_or(&config.orm_path)
            .to_string();
        Self {
            orm_path: config.orm_path.clone(),
            orm_name,
            handle_type: config.handle_type.clone(),
            session_method: config.session_method.clone(),
            session_type: config.session_type.clone(),
            immutable: config.immutable_methods.iter().cloned().collect(),
            finishers: config.finishers.iter().cloned().collect(),
        }
    }

    pub fn orm_path(&self) -> &str {
        &self.orm_path
    }

    pub fn orm_name(&self) -> &str {
        &self.orm_name
    }

    /// The ORM package itself or a vendored copy of it
    pub fn is_orm_package(&self, package: &str) -> bool {
        package == self.orm_path
            || package
                .strip_suffix(self.orm_path.as_str())
                .is_some_and(|prefix| prefix.ends_with('/'))
    }

    /// Pointer to the ORM's handle type
    pub fn is_handle(&self, types: &TypeTable, ty: TypeId) -> bool {
        let Some(TypeKind::Pointer { elem }) = types.get(ty) else {
            return false;
        };
        matches!(
            types.get(*elem),
            Some(TypeKind::Named { package, name }) if name == &self.handle_type && self.is_orm_package(package)
        )
    }

    /// Whether `ty` mentions the handle anywhere in its structure
    pub fn contains_handle(&self, types: &TypeTable, ty: TypeId) -> bool {
        let mut visited = FxHashSet::default();
        self.contains_handle_inner(types, ty, &mut visited)
    }

    fn contains_handle_inner(&self, types: &TypeTable, ty: TypeId, visited: &mut FxHashSet<TypeId>) -> bool {
        if !visited.insert(ty) {
            return false;
        }
        if self.is_handle(types, ty) {
            return true;
        }
        let Some(kind) = types.get(ty) else {
            return false;
        };
        match kind {
            TypeKind::Pointer { elem }
            | TypeKind::Slice { elem }
            | TypeKind::Array { elem, .. }
            | TypeKind::Chan { elem } => self.contains_handle_inner(types, *elem, visited),
            TypeKind::Map { key, value } => {
                self.contains_handle_inner(types, *key, visited) || self.contains_handle_inner(types, *value, visited)
            }
            TypeKind::Struct { fields } => fields
                .iter()
                .any(|field| self.contains_handle_inner(types, field.ty, visited)),
            TypeKind::Tuple { elems } => elems.iter().any(|e| self.contains_handle_inner(types, *e, visited)),
            TypeKind::Signature { params, results, .. } => params
                .iter()
                .chain(results)
                .any(|t| self.contains_handle_inner(types, *t, visited)),
            TypeKind::Named { .. } => types
                .underlying(ty)
                .is_some_and(|under| self.contains_handle_inner(types, under, visited)),
            TypeKind::Basic { .. } | TypeKind::Interface { .. } | TypeKind::TypeParam { .. } => false,
        }
    }

    /// Whether any parameter (including a method receiver) of a signature mentions the handle
    pub fn params_contain_handle(&self, types: &TypeTable, signature: TypeId) -> bool {
        types
            .signature_parts(signature)
            .is_some_and(|(params, _)| params.iter().any(|p| self.contains_handle(types, *p)))
    }

    pub fn results_contain_handle(&self, types: &TypeTable, signature: TypeId) -> bool {
        types
            .signature_parts(signature)
            .is_some_and(|(_, results)| results.iter().any(|r| self.contains_handle(types, *r)))
    }

    pub fn returns_immutable(&self, name: &str) -> bool {
        self.immutable.contains(name)
    }

    pub fn is_finisher(&self, name: &str) -> bool {
        self.finishers.contains(name)
    }

    /// A method declared on the handle type
    pub fn is_handle_method(&self, func: &FunctionRef) -> bool {
        self.is_orm_package(&func.package) && func.receiver_base() == Some(self.handle_type.as_str())
    }

    /// A handle method that shares state with its receiver
    pub fn is_chain_method(&self, func: &FunctionRef) -> bool {
        self.is_handle_method(func) && !self.returns_immutable(&func.name)
    }

    /// An ORM function or method whose result is a fresh handle
    pub fn is_immutable_call(&self, func: &FunctionRef) -> bool {
        self.is_orm_package(&func.package) && self.returns_immutable(&func.name)
    }

    /// `*gorm.DB`
    pub fn handle_type_name(&self) -> String {
        format!("*{}.{}", self.orm_name, self.handle_type)
    }

    /// `.Session(&gorm.Session{})`, with the ORM package under `import_name`
    pub fn session_call(&self, import_name: &str) -> String {
        format!(".{}(&{}.{}{{}})", self.session_method, import_name, self.session_type)
    }

    pub fn reuse_message(&self) -> String {
        format!(
            "{} instance reused after chain method (use {} to make it safe)",
            self.handle_type_name(),
            self.session_call(&self.orm_name)
        )
    }

    pub fn pollutes_message(&self, method: &str) -> String {
        format!(
            "pure function pollutes {} argument by calling {}",
            self.handle_type_name(),
            method
        )
    }

    pub fn leaks_message(&self, callee: &str) -> String {
        format!(
            "pure function passes {} argument to non-pure function {}",
            self.handle_type_name(),
            callee
        )
    }

    pub fn returns_polluted_message(&self) -> String {
        format!(
            "pure function returns Polluted {} (expected Clean or Depends)",
            self.handle_type_name()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalogue() -> Catalogue {
        Catalogue::new(&AnalyzerConfig::default())
    }

    #[test]
    fn test_is_handle() {
        let cat = catalogue();
        let mut types = TypeTable::new();
        let db = types.named("gorm.io/gorm", "DB");
        let ptr = types.pointer(db);
        let vendored = types.named("example.com/app/vendor/gorm.io/gorm", "DB");
        let vendored_ptr = types.pointer(vendored);
        let fake = types.named("notgorm.io/gorm", "DB");
        let fake_ptr = types.pointer(fake);

        assert!(cat.is_handle(&types, ptr));
        assert!(cat.is_handle(&types, vendored_ptr));
        assert!(!cat.is_handle(&types, db));
        assert!(!cat.is_handle(&types, fake_ptr));
    }

    #[test]
    fn test_contains_handle_is_transitive() {
        let cat = catalogue();
        let mut types = TypeTable::new();
        let db = types.named("gorm.io/gorm", "DB");
        let ptr = types.pointer(db);
        let string = types.basic("string");
        let map = types.map(string, ptr);
        let repo = types.named("example.com/app", "Repo");
        let body = types.struct_of(vec![("conns", map)]);
        types.set_underlying(repo, body);
        let repo_ptr = types.pointer(repo);
        let plain = types.struct_of(vec![("name", string)]);

        assert!(cat.contains_handle(&types, repo_ptr));
        assert!(!cat.contains_handle(&types, plain));

        let sig = types.signature(vec![string], vec![repo_ptr]);
        assert!(!cat.params_contain_handle(&types, sig));
        assert!(cat.results_contain_handle(&types, sig));
    }

    #[test]
    fn test_recursive_type_terminates() {
        let cat = catalogue();
        let mut types = TypeTable::new();
        let node = types.named("example.com/app", "Node");
        let next = types.pointer(node);
        let body = types.struct_of(vec![("next", next)]);
        types.set_underlying(node, body);
        assert!(!cat.contains_handle(&types, next));
    }

    #[test]
    fn test_method_classes() {
        let cat = catalogue();
        let where_ = FunctionRef::method("gorm.io/gorm", "*DB", "Where");
        let session = FunctionRef::method("gorm.io/gorm", "*DB", "Session");
        let open = FunctionRef::function("gorm.io/gorm", "Open");
        let stmt = FunctionRef::method("gorm.io/gorm", "*Statement", "Where");

        assert!(cat.is_chain_method(&where_));
        assert!(!cat.is_chain_method(&session));
        assert!(cat.is_immutable_call(&session));
        assert!(cat.is_immutable_call(&open));
        assert!(!cat.is_handle_method(&stmt));
        assert!(cat.is_finisher("Count"));
        assert!(!cat.is_finisher("Where"));
    }

    #[test]
    fn test_messages() {
        let cat = catalogue();
        assert_eq!(
            cat.reuse_message(),
            "*gorm.DB instance reused after chain method (use .Session(&gorm.Session{}) to make it safe)"
        );
        assert_eq!(
            cat.pollutes_message("Where"),
            "pure function pollutes *gorm.DB argument by calling Where"
        );
        assert_eq!(
            cat.leaks_message("helper"),
            "pure function passes *gorm.DB argument to non-pure function helper"
        );
        assert_eq!(cat.session_call("g"), ".Session(&g.Session{})");
    }
}
