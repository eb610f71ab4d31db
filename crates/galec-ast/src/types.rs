//! The Gale type universe.
//!
//! Types are a sum of variants with structural equality on their payloads,
//! allocated in a [`TypeArena`] and addressed by [`TyId`]. The arena
//! deduplicates structurally, so two `TyId`s compare equal iff they denote
//! the same type. Type variables are the one exception: every request for a
//! variable yields a fresh, unique one.

use galec_util::{define_idx, FxHashMap, IndexVec, Symbol};

use crate::ast::{DeclId, NamespacedIdent};

define_idx! {
    /// Handle to a type in the [`TypeArena`].
    pub struct TyId;
}

/// Integer signedness.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Signedness {
    Signed,
    Unsigned,
}

/// The floating point widths the language supports.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FloatWidth {
    F16,
    F32,
    F64,
    F80,
}

impl FloatWidth {
    pub fn bit_width(self) -> u32 {
        match self {
            FloatWidth::F16 => 16,
            FloatWidth::F32 => 32,
            FloatWidth::F64 => 64,
            FloatWidth::F80 => 80,
        }
    }
}

/// Pointer flavor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PointerKind {
    Raw,
    Unique,
    Shared,
}

/// A single enum case.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct EnumCase {
    pub name: Symbol,
    pub value: i64,
}

/// A type in the Gale type system.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Type {
    /// Fixed-width integer type.
    Int { signedness: Signedness, bit_width: u32 },
    /// Floating point type.
    Float { width: FloatWidth },
    Bool,
    Char,
    Void,
    /// The type of the null literal.
    Null,
    /// Pointer to a pointee.
    Pointer { pointee: TyId, kind: PointerKind },
    /// Fixed-size array.
    StaticArray { elem: TyId, size: u64 },
    /// Growable array.
    DynamicArray { elem: TyId },
    /// Function type.
    Function {
        params: Vec<TyId>,
        ret: TyId,
        c_variadic: bool,
    },
    /// Struct type; identity is the declaration plus template arguments.
    Struct {
        decl: DeclId,
        template_args: Vec<TyId>,
    },
    /// Enum type.
    Enum {
        name: Symbol,
        cases: Vec<EnumCase>,
        decl: DeclId,
    },
    /// Transparent alias; unification and conversion unwrap it.
    TypeAlias {
        name: Symbol,
        aliased: TyId,
        decl: DeclId,
    },
    /// Pre-sema placeholder for a name the parser could not resolve.
    UnresolvedName { ident: NamespacedIdent },
    /// Inference variable, unique per use.
    TypeVar { id: u32 },
}

/// Arena of interned types.
pub struct TypeArena {
    types: IndexVec<TyId, Type>,
    interned: FxHashMap<Type, TyId>,
    next_type_var: u32,
}

impl TypeArena {
    pub fn new() -> Self {
        Self {
            types: IndexVec::new(),
            interned: FxHashMap::default(),
            next_type_var: 0,
        }
    }

    /// Intern a type, structurally deduplicating.
    ///
    /// Type variables must be created through [`TypeArena::fresh_type_var`];
    /// interning one here would defeat their per-use identity.
    pub fn intern(&mut self, ty: Type) -> TyId {
        debug_assert!(
            !matches!(ty, Type::TypeVar { .. }),
            "type variables are created with fresh_type_var"
        );
        if let Some(&id) = self.interned.get(&ty) {
            return id;
        }
        let id = self.types.push(ty.clone());
        self.interned.insert(ty, id);
        id
    }

    /// Create a fresh type variable, distinct from every other.
    pub fn fresh_type_var(&mut self) -> TyId {
        let id = self.next_type_var;
        self.next_type_var += 1;
        self.types.push(Type::TypeVar { id })
    }

    pub fn get(&self, id: TyId) -> &Type {
        &self.types[id]
    }

    /// Unwrap alias chains to the underlying type.
    pub fn resolve_alias(&self, mut id: TyId) -> TyId {
        while let Type::TypeAlias { aliased, .. } = self.types[id] {
            id = aliased;
        }
        id
    }

    pub fn is_type_var(&self, id: TyId) -> bool {
        matches!(self.get(self.resolve_alias(id)), Type::TypeVar { .. })
    }

    /// True if any type variable occurs anywhere inside `id`.
    pub fn contains_type_vars(&self, id: TyId) -> bool {
        match self.get(id) {
            Type::TypeVar { .. } => true,
            Type::TypeAlias { aliased, .. } => self.contains_type_vars(*aliased),
            Type::Pointer { pointee, .. } => self.contains_type_vars(*pointee),
            Type::StaticArray { elem, .. } | Type::DynamicArray { elem } => {
                self.contains_type_vars(*elem)
            }
            Type::Function { params, ret, .. } => {
                params.iter().any(|&p| self.contains_type_vars(p))
                    || self.contains_type_vars(*ret)
            }
            Type::Struct { template_args, .. } => {
                template_args.iter().any(|&a| self.contains_type_vars(a))
            }
            _ => false,
        }
    }

    // Convenience constructors for the common types.

    pub fn int(&mut self, signedness: Signedness, bit_width: u32) -> TyId {
        assert!(bit_width > 0, "integer bit width must be positive");
        self.intern(Type::Int {
            signedness,
            bit_width,
        })
    }

    pub fn int32(&mut self) -> TyId {
        self.int(Signedness::Signed, 32)
    }

    pub fn int64(&mut self) -> TyId {
        self.int(Signedness::Signed, 64)
    }

    pub fn uint64(&mut self) -> TyId {
        self.int(Signedness::Unsigned, 64)
    }

    pub fn float(&mut self, width: FloatWidth) -> TyId {
        self.intern(Type::Float { width })
    }

    pub fn float64(&mut self) -> TyId {
        self.float(FloatWidth::F64)
    }

    pub fn bool_ty(&mut self) -> TyId {
        self.intern(Type::Bool)
    }

    pub fn char_ty(&mut self) -> TyId {
        self.intern(Type::Char)
    }

    pub fn void(&mut self) -> TyId {
        self.intern(Type::Void)
    }

    pub fn null(&mut self) -> TyId {
        self.intern(Type::Null)
    }

    pub fn pointer(&mut self, pointee: TyId, kind: PointerKind) -> TyId {
        self.intern(Type::Pointer { pointee, kind })
    }

    pub fn raw_pointer(&mut self, pointee: TyId) -> TyId {
        self.pointer(pointee, PointerKind::Raw)
    }

    pub fn static_array(&mut self, elem: TyId, size: u64) -> TyId {
        self.intern(Type::StaticArray { elem, size })
    }

    pub fn function(&mut self, params: Vec<TyId>, ret: TyId) -> TyId {
        self.intern(Type::Function {
            params,
            ret,
            c_variadic: false,
        })
    }

    pub fn function_variadic(&mut self, params: Vec<TyId>, ret: TyId) -> TyId {
        self.intern(Type::Function {
            params,
            ret,
            c_variadic: true,
        })
    }
}

impl Default for TypeArena {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Index<TyId> for TypeArena {
    type Output = Type;

    fn index(&self, id: TyId) -> &Type {
        &self.types[id]
    }
}
