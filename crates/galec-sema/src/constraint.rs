//! Type constraints.
//!
//! A constraint relates types (or groups other constraints) and carries one
//! locator: the AST expression it originated from, which anchors diagnostics
//! and receives synthesized implicit casts.

use galec_ast::{DeclId, ExprId, TyId};

/// A more precise conversion rule attached to some relational constraints.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConversionRestriction {
    /// Deep structural equality.
    DeepEquality,
    /// Array to pointer decay.
    ArrayToPointer,
    /// String literal to pointer.
    StringToPointer,
    /// Pointer to pointer.
    PointerToPointer,
}

/// The different kinds of type constraints.
#[derive(Clone, Debug)]
pub enum ConstraintKind {
    /// The two types must be bound to the same type.
    Bind { first: TyId, second: TyId },
    /// Like `Bind`, but ignores lvalueness.
    Equal { first: TyId, second: TyId },
    /// First type is the element type of the second (a pointer).
    BindToPointerType { first: TyId, second: TyId },
    /// First type is implicitly convertible to the second.
    Conversion { first: TyId, second: TyId },
    /// Conversion in function-argument position.
    ArgumentConversion { first: TyId, second: TyId },
    /// Conversion in operator-argument position.
    OperatorArgumentConversion { first: TyId, second: TyId },
    /// Explicitly checked cast from first to second.
    CheckedCast { first: TyId, second: TyId },
    /// First type may fall back to the second if nothing else binds it.
    Defaultable { first: TyId, second: TyId },
    /// First is an l-value whose object type is the second.
    LValueObject { first: TyId, second: TyId },
    /// Binds the type to a specific function overload.
    BindOverload { ty: TyId, choice: DeclId },
    /// First type has a value member typed as the second.
    ValueMember {
        base: TyId,
        member: TyId,
        member_expr: ExprId,
    },
    /// Like `ValueMember` with an implicit base.
    UnresolvedValueMember {
        base: TyId,
        member: TyId,
        member_expr: ExprId,
    },
    /// At least one child must hold.
    Disjunction {
        children: Vec<Constraint>,
        remember_choice: bool,
    },
    /// All children must hold.
    Conjunction { children: Vec<Constraint> },
    /// The type can be expressed by an integer literal.
    ExpressibleByIntLiteral { ty: TyId },
    /// The type can be expressed by a float literal.
    ExpressibleByFloatLiteral { ty: TyId },
    /// The type can be expressed by a boolean literal.
    ExpressibleByBoolLiteral { ty: TyId },
    /// The type can be expressed by a string literal.
    ExpressibleByStringLiteral { ty: TyId },
    /// The aggregate's declared fields must accept the initializer's fields
    /// in declaration order, with defaults filling the omitted tail.
    StructInitializer { ty: TyId, expr: ExprId },
}

/// A constraint plus its locator, restriction, and solver flags.
#[derive(Clone, Debug)]
pub struct Constraint {
    pub kind: ConstraintKind,
    /// The AST expression this constraint comes from.
    pub locator: ExprId,
    pub restriction: Option<ConversionRestriction>,
    pub active: bool,
    pub disabled: bool,
    pub favored: bool,
    pub discarded: bool,
}

impl Constraint {
    pub fn new(kind: ConstraintKind, locator: ExprId) -> Self {
        Self {
            kind,
            locator,
            restriction: None,
            active: true,
            disabled: false,
            favored: false,
            discarded: false,
        }
    }

    pub fn with_restriction(mut self, restriction: ConversionRestriction) -> Self {
        self.restriction = Some(restriction);
        self
    }

    pub fn is_defaultable(&self) -> bool {
        matches!(self.kind, ConstraintKind::Defaultable { .. })
    }

    /// Short human-readable name of the constraint kind, for failure traces.
    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            ConstraintKind::Bind { .. } => "bind",
            ConstraintKind::Equal { .. } => "equality",
            ConstraintKind::BindToPointerType { .. } => "pointer binding",
            ConstraintKind::Conversion { .. } => "implicit conversion",
            ConstraintKind::ArgumentConversion { .. } => "argument conversion",
            ConstraintKind::OperatorArgumentConversion { .. } => "operator argument conversion",
            ConstraintKind::CheckedCast { .. } => "cast",
            ConstraintKind::Defaultable { .. } => "defaultable",
            ConstraintKind::LValueObject { .. } => "l-value",
            ConstraintKind::BindOverload { .. } => "overload binding",
            ConstraintKind::ValueMember { .. } => "member access",
            ConstraintKind::UnresolvedValueMember { .. } => "member access",
            ConstraintKind::Disjunction { .. } => "disjunction",
            ConstraintKind::Conjunction { .. } => "conjunction",
            ConstraintKind::ExpressibleByIntLiteral { .. } => "integer literal",
            ConstraintKind::ExpressibleByFloatLiteral { .. } => "float literal",
            ConstraintKind::ExpressibleByBoolLiteral { .. } => "boolean literal",
            ConstraintKind::ExpressibleByStringLiteral { .. } => "string literal",
            ConstraintKind::StructInitializer { .. } => "struct initializer",
        }
    }

    /// The two related types of a binary relational constraint.
    pub fn relation(&self) -> Option<(TyId, TyId)> {
        match self.kind {
            ConstraintKind::Bind { first, second }
            | ConstraintKind::Equal { first, second }
            | ConstraintKind::BindToPointerType { first, second }
            | ConstraintKind::Conversion { first, second }
            | ConstraintKind::ArgumentConversion { first, second }
            | ConstraintKind::OperatorArgumentConversion { first, second }
            | ConstraintKind::CheckedCast { first, second }
            | ConstraintKind::Defaultable { first, second }
            | ConstraintKind::LValueObject { first, second } => Some((first, second)),
            _ => None,
        }
    }
}
