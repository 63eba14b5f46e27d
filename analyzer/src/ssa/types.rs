//! Type table
//!
//! Structural types are interned, so two requests for `*gorm.DB` return the
//! same `TypeId`. Named types are identified by package path and name; their
//! underlying type is recorded separately because it may refer back to the
//! named type itself.

use fxhash::FxHashMap;
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

use super::ids::TypeId;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StructField {
    pub name: String,
    pub ty: TypeId,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TypeKind {
    Basic { name: String },
    Named { package: String, name: String },
    Pointer { elem: TypeId },
    Slice { elem: TypeId },
    Array { len: u64, elem: TypeId },
    Map { key: TypeId, value: TypeId },
    Chan { elem: TypeId },
    Struct { fields: Vec<StructField> },
    Interface { methods: Vec<String> },
    Signature {
        params: Vec<TypeId>,
        results: Vec<TypeId>,
        variadic: bool,
    },
    Tuple { elems: Vec<TypeId> },
    TypeParam { name: String },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TypeTable {
    types: IndexSet<TypeKind>,
    #[serde(default)]
    underlying: FxHashMap<TypeId, TypeId>,
}

impl TypeTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&mut self, kind: TypeKind) -> TypeId {
        let (index, _) = self.types.insert_full(kind);
        TypeId::from_index(index)
    }

    pub fn get(&self, id: TypeId) -> Option<&TypeKind> {
        self.types.get_index(id.index())
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn basic(&mut self, name: &str) -> TypeId {
        self.intern(TypeKind::Basic { name: name.to_string() })
    }

    pub fn named(&mut self, package: &str, name: &str) -> TypeId {
        self.intern(TypeKind::Named {
            package: package.to_string(),
            name: name.to_string(),
        })
    }

    pub fn pointer(&mut self, elem: TypeId) -> TypeId {
        self.intern(TypeKind::Pointer { elem })
    }

    pub fn slice(&mut self, elem: TypeId) -> TypeId {
        self.intern(TypeKind::Slice { elem })
    }

    pub fn array(&mut self, len: u64, elem: TypeId) -> TypeId {
        self.intern(TypeKind::Array { len, elem })
    }

    pub fn map(&mut self, key: TypeId, value: TypeId) -> TypeId {
        self.intern(TypeKind::Map { key, value })
    }

    pub fn chan(&mut self, elem: TypeId) -> TypeId {
        self.intern(TypeKind::Chan { elem })
    }

    pub fn struct_of(&mut self, fields: Vec<(&str, TypeId)>) -> TypeId {
        let fields = fields
            .into_iter()
            .map(|(name, ty)| StructField { name: name.to_string(), ty })
            .collect();
        self.intern(TypeKind::Struct { fields })
    }

    pub fn interface(&mut self, methods: &[&str]) -> TypeId {
        self.intern(TypeKind::Interface {
            methods: methods.iter().map(|m| m.to_string()).collect(),
        })
    }

    pub fn signature(&mut self, params: Vec<TypeId>, results: Vec<TypeId>) -> TypeId {
        self.intern(TypeKind::Signature {
            params,
            results,
            variadic: false,
        })
    }

    pub fn tuple(&mut self, elems: Vec<TypeId>) -> TypeId {
        self.intern(TypeKind::Tuple { elems })
    }

    pub fn type_param(&mut self, name: &str) -> TypeId {
        self.intern(TypeKind::TypeParam { name: name.to_string() })
    }

    /// Record the underlying type of a named type
    pub fn set_underlying(&mut self, named: TypeId, underlying: TypeId) {
        self.underlying.insert(named, underlying);
    }

    pub fn underlying(&self, named: TypeId) -> Option<TypeId> {
        self.underlying.get(&named).copied()
    }

    /// Pointee of a pointer type
    pub fn elem(&self, ty: TypeId) -> Option<TypeId> {
        match self.get(ty)? {
            TypeKind::Pointer { elem } | TypeKind::Slice { elem } | TypeKind::Chan { elem } => Some(*elem),
            TypeKind::Array { elem, .. } => Some(*elem),
            _ => None,
        }
    }

    /// Parameter and result lists of a signature type
    pub fn signature_parts(&self, ty: TypeId) -> Option<(&[TypeId], &[TypeId])> {
        match self.get(ty)? {
            TypeKind::Signature { params, results, .. } => Some((params, results)),
            _ => None,
        }
    }

    /// Go-style rendering with package names instead of paths,
    /// e.g. `*gorm.DB` or `map[string][]*gorm.DB`.
    pub fn display(&self, ty: TypeId) -> String {
        let mut out = String::new();
        self.write_type(ty, &mut out, 0);
        out
    }

    fn write_type(&self, ty: TypeId, out: &mut String, depth: usize) {
        if depth > 32 {
            out.push_str("...");
            return;
        }
        let Some(kind) = self.get(ty) else {
            out.push_str("invalid");
            return;
        };
        match kind {
            TypeKind::Basic { name } | TypeKind::TypeParam { name } => out.push_str(name),
            TypeKind::Named { package, name } => {
                let pkg = package.rsplit('/').next().unwrap_or(package);
                if !pkg.is_empty() {
                    out.push_str(pkg);
                    out.push('.');
                }
                out.push_str(name);
            }
            TypeKind::Pointer { elem } => {
                out.push('*');
                self.write_type(*elem, out, depth + 1);
            }
            TypeKind::Slice { elem } => {
                out.push_str("[]");
                self.write_type(*elem, out, depth + 1);
            }
            TypeKind::Array { len, elem } => {
                out.push_str(&format!("[{}]", len));
                self.write_type(*elem, out, depth + 1);
            }
            TypeKind::Map { key, value } => {
                out.push_str("map[");
                self.write_type(*key, out, depth + 1);
                out.push(']');
                self.write_type(*value, out, depth + 1);
            }
            TypeKind::Chan { elem } => {
                out.push_str("chan ");
                self.write_type(*elem, out, depth + 1);
            }
            TypeKind::Struct { fields } => {
                out.push_str("struct{");
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        out.push_str("; ");
                    }
                    out.push_str(&field.name);
                    out.push(' ');
                    self.write_type(field.ty, out, depth + 1);
                }
                out.push('}');
            }
            TypeKind::Interface { methods } => {
                out.push_str("interface{");
                out.push_str(&methods.join("; "));
                out.push('}');
            }
            TypeKind::Signature { params, results, .. } => {
                out.push_str("func");
                self.write_list(params, out, depth);
                match results.as_slice() {
                    [] => {}
                    [single] => {
                        out.push(' ');
                        self.write_type(*single, out, depth + 1);
                    }
                    many => {
                        out.push(' ');
                        self.write_list(many, out, depth);
                    }
                }
            }
            TypeKind::Tuple { elems } => self.write_list(elems, out, depth),
        }
    }

    fn write_list(&self, items: &[TypeId], out: &mut String, depth: usize) {
        out.push('(');
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            self.write_type(*item, out, depth + 1);
        }
        out.push(')');
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interning() {
        let mut types = TypeTable::new();
        let db = types.named("gorm.io/gorm", "DB");
        let a = types.pointer(db);
        let b = types.pointer(db);
        assert_eq!(a, b);
        assert_eq!(types.len(), 2);
        assert_eq!(types.elem(a), Some(db));
    }

    #[test]
    fn test_display() {
        let mut types = TypeTable::new();
        let db = types.named("gorm.io/gorm", "DB");
        let ptr = types.pointer(db);
        let string = types.basic("string");
        let error = types.named("", "error");
        let map = types.map(string, ptr);
        let sig = types.signature(vec![ptr], vec![ptr, error]);

        assert_eq!(types.display(ptr), "*gorm.DB");
        assert_eq!(types.display(map), "map[string]*gorm.DB");
        assert_eq!(types.display(sig), "func(*gorm.DB) (*gorm.DB, error)");
        assert_eq!(types.display(TypeId::invalid()), "invalid");
    }

    #[test]
    fn test_recursive_named_type() {
        let mut types = TypeTable::new();
        let node = types.named("example.com/app", "Node");
        let next = types.pointer(node);
        let body = types.struct_of(vec![("next", next)]);
        types.set_underlying(node, body);
        assert_eq!(types.underlying(node), Some(body));
        assert_eq!(types.display(body), "struct{next *app.Node}");
    }

    #[test]
    fn test_serde_round_trip_keeps_ids() {
        let mut types = TypeTable::new();
        let db = types.named("gorm.io/gorm", "DB");
        let ptr = types.pointer(db);
        let body = types.struct_of(vec![]);
        types.set_underlying(db, body);

        let json = serde_json::to_string(&types).unwrap();
        let back: TypeTable = serde_json::from_str(&json).unwrap();
        assert_eq!(back.display(ptr), "*gorm.DB");
        assert_eq!(back.underlying(db), Some(body));
    }
}
