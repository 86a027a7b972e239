//! The untyped expression tree: the shape produced by the (external,
//! consumed-only) parser and handed to the expression typer.
//!
//! Every node is paired with a [`Pos`](crate::pos::Pos) by its containing
//! [`UNode`]. The tree is intentionally "dumb" — no name resolution, no
//! type information, no desugaring — since producing it is explicitly out
//! of scope for this workspace; fixtures and tests build it by hand or by
//! deserializing it from JSON.

use ember_common::Span;
use serde::{Deserialize, Serialize};

use crate::pos::Pos;
use crate::ty_expr::UTypeExpr;

/// An untyped node: the expression plus the position it occupies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UNode {
    pub expr: UExpr,
    pub pos: Pos,
}

impl UNode {
    pub fn new(expr: UExpr, pos: Pos) -> Self {
        Self { expr, pos }
    }

    pub fn synthetic(expr: UExpr) -> Self {
        Self { expr, pos: Pos::synthetic() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum UConstant {
    Int(i64),
    Float(f64),
    String(String),
    Bool(bool),
    Null,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    NotEq,
    Lt,
    Gt,
    LtEq,
    GtEq,
    And,
    Or,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    Range,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnOp {
    Neg,
    Not,
    Increment,
    Decrement,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UParam {
    pub name: String,
    pub ty: Option<UTypeExpr>,
    pub optional: bool,
    pub default: Option<Box<UNode>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UFunctionLit {
    pub params: Vec<UParam>,
    pub ret: Option<UTypeExpr>,
    pub body: Box<UNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UCatch {
    pub name: String,
    pub ty: UTypeExpr,
    pub body: Box<UNode>,
    pub pos: Pos,
}

/// A sub-pattern inside a constructor pattern's argument list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum USubPattern {
    Bind(String),
    Wildcard,
}

/// A `switch`/`match` case pattern. `Value` covers value-switch literal and
/// expression cases; `Constructor` and `Wildcard` cover enum-match arms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum UCasePattern {
    Value(Box<UNode>),
    Constructor { name: String, args: Vec<USubPattern> },
    Wildcard,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UCase {
    pub pattern: UCasePattern,
    pub guard: Option<Box<UNode>>,
    pub body: Box<UNode>,
    pub pos: Pos,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum UExpr {
    Const(UConstant),
    This,
    Super,
    Ident(String),
    /// `a.b.c` is represented as `Field(Field(Ident(a), b), c)`.
    Field(Box<UNode>, String),
    Index(Box<UNode>, Box<UNode>),
    ArrayLit(Vec<UNode>),
    ObjectLit(Vec<(String, UNode)>),
    Block(Vec<UNode>),
    Var {
        name: String,
        ty: Option<UTypeExpr>,
        init: Option<Box<UNode>>,
        is_static: bool,
    },
    If {
        cond: Box<UNode>,
        then_branch: Box<UNode>,
        else_branch: Option<Box<UNode>>,
    },
    While {
        cond: Box<UNode>,
        body: Box<UNode>,
        do_while: bool,
    },
    For {
        var_name: String,
        iterable: Box<UNode>,
        body: Box<UNode>,
    },
    Switch {
        subject: Box<UNode>,
        cases: Vec<UCase>,
        default: Option<Box<UNode>>,
        /// `false` when used as a statement: arms may be `void`.
        need_val: bool,
    },
    Ternary {
        cond: Box<UNode>,
        then_branch: Box<UNode>,
        else_branch: Box<UNode>,
    },
    Return(Option<Box<UNode>>),
    Break,
    Continue,
    Throw(Box<UNode>),
    Try {
        body: Box<UNode>,
        catches: Vec<UCatch>,
    },
    Function(UFunctionLit),
    New {
        path: String,
        type_args: Vec<UTypeExpr>,
        args: Vec<UNode>,
    },
    Unop {
        op: UnOp,
        operand: Box<UNode>,
        postfix: bool,
    },
    Binop {
        op: BinOp,
        lhs: Box<UNode>,
        rhs: Box<UNode>,
    },
    Assign {
        lhs: Box<UNode>,
        rhs: Box<UNode>,
    },
    OpAssign {
        op: BinOp,
        lhs: Box<UNode>,
        rhs: Box<UNode>,
    },
    Call {
        callee: Box<UNode>,
        args: Vec<UNode>,
    },
    Cast {
        expr: Box<UNode>,
        ty: Option<UTypeExpr>,
    },
    Untyped(Box<UNode>),
    /// Editor-integration reflection query: "what fields does this expression have".
    Display(Box<UNode>),
}

/// Convenience constructor used heavily by hand-written test fixtures.
pub fn node(expr: UExpr, start: u32, end: u32) -> UNode {
    UNode::new(expr, Pos::new("<test>", Span::new(start, end)))
}
