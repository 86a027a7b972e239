//! The typed expression tree: the output shape required by §6, "every node
//! has `(eexpr, etype, epos)`". The (external, consumed-only) parser and
//! module loader never see this type; it is produced exclusively by
//! `expr.rs` and consumed by the (external) code generators, the doc
//! emitter, and the reachability walker (C8).
//!
//! Every implicit operation the distilled spec calls out — property
//! accessors, inline expansion, closure capture, macro expansion, nullable
//! coercion — is made explicit here as its own node rather than folded
//! back into a generic "field access" or "call" shape, so a downstream
//! consumer never has to re-derive what the typer already decided.

use ember_ast::{BinOp, UConstant, UnOp};

use crate::ty::Ty;
use ember_ast::Pos;

/// One typed node: the elaborated expression, its resolved type, and the
/// position carried forward unchanged from the untyped tree.
#[derive(Debug, Clone)]
pub struct TNode {
    pub expr: TExpr,
    pub ty: Ty,
    pub pos: Pos,
}

impl TNode {
    pub fn new(expr: TExpr, ty: Ty, pos: Pos) -> Self {
        TNode { expr, ty, pos }
    }
}

#[derive(Debug, Clone)]
pub struct TCatch {
    pub name: String,
    pub ty: Ty,
    pub body: Box<TNode>,
}

#[derive(Debug, Clone)]
pub struct TFunctionLit {
    pub params: Vec<(String, Ty)>,
    pub ret: Ty,
    pub body: Box<TNode>,
}

/// One arm of an enum-match (§4.5a "Switch/Match", enum mode): binds each
/// constructor argument pattern (`_` or a name) to the field's type.
#[derive(Debug, Clone)]
pub struct TEnumArm {
    pub constructor: String,
    pub bindings: Vec<Option<String>>,
    pub guard: Option<Box<TNode>>,
    pub body: Box<TNode>,
}

/// One arm of a value switch: a constant (or already-typed) case expression
/// compared against the subject.
#[derive(Debug, Clone)]
pub struct TValueArm {
    pub value: Box<TNode>,
    pub guard: Option<Box<TNode>>,
    pub body: Box<TNode>,
}

#[derive(Debug, Clone)]
pub enum TExpr {
    Const(UConstant),
    /// A local variable read, resolved by the access-kind resolver.
    Local(String),
    /// A direct instance-field read/write slot (`Var + AccNormal`, or the
    /// self-accessor exception reading the raw slot from inside its own
    /// accessor method).
    Field { receiver: Box<TNode>, name: String },
    /// A direct static-field read/write slot.
    StaticField { class: String, name: String },
    /// `Constructor` or `Constructor(args)` of an enum, fully applied.
    EnumCtor { enum_name: String, ctor: String, args: Vec<TNode> },
    /// A bare reference to a type itself (module-path resolution, or the
    /// receiver of a static call written as `TypeName.method(...)`).
    TypeRef(String),
    Index(Box<TNode>, Box<TNode>),
    ArrayLit(Vec<TNode>),
    ObjectLit(Vec<(String, TNode)>),
    Block(Vec<TNode>),
    Var { name: String, init: Option<Box<TNode>>, is_static: bool },
    If { cond: Box<TNode>, then_branch: Box<TNode>, else_branch: Option<Box<TNode>> },
    While { cond: Box<TNode>, body: Box<TNode>, do_while: bool },
    For { var_name: String, iterable: Box<TNode>, body: Box<TNode> },
    SwitchEnum { subject: Box<TNode>, arms: Vec<TEnumArm>, default: Option<Box<TNode>> },
    SwitchValue { subject: Box<TNode>, arms: Vec<TValueArm>, default: Option<Box<TNode>> },
    Ternary { cond: Box<TNode>, then_branch: Box<TNode>, else_branch: Box<TNode> },
    Return(Option<Box<TNode>>),
    Break,
    Continue,
    Throw(Box<TNode>),
    Try { body: Box<TNode>, catches: Vec<TCatch> },
    Function(TFunctionLit),
    New { class: String, args: Vec<TNode> },
    Unop { op: UnOp, operand: Box<TNode>, postfix: bool },
    Binop { op: BinOp, lhs: Box<TNode>, rhs: Box<TNode> },
    Assign { lhs: Box<TNode>, rhs: Box<TNode> },
    /// Compound assign re-tagged after typing `x op y`, per §4.5 "Compound
    /// assignment" — the `Expr` (non-`Set`) path.
    OpAssign { op: BinOp, lhs: Box<TNode>, rhs: Box<TNode> },
    /// The property-setter lowering of a `Set`-kind access: `{ let v =
    /// receiver; v.setter(computed) }`, wrapped in a single block so the
    /// receiver is evaluated exactly once (invariant 3, §8).
    SetterBlock { receiver_name: String, receiver: Box<TNode>, setter: String, value: Box<TNode> },
    Call { callee: Box<TNode>, args: Vec<TNode> },
    /// An explicit closure synthesized over a receiver — the "closure
    /// emission rule" for reading a method or a read-only function-typed
    /// field, and the lowering target for `Inline`/`Using` read in a
    /// non-call context.
    Closure { receiver: Option<Box<TNode>>, method: String, ty: Ty },
    /// The eta-expansion lowering of a `Using` access read without being
    /// immediately called: `fun e -> fun args -> call(e, args)` applied to
    /// the captured receiver.
    UsingEta { static_method: String, captured_receiver: Box<TNode> },
    /// An inline method's body, cloned at the call site with positions
    /// rewritten (not executed here — splicing is `field_access.rs`'s job;
    /// this node is what gets spliced).
    Inlined(Box<TNode>),
    Cast { expr: Box<TNode>, checked_class: Option<String> },
    /// `untyped` escape: the inner expression is typed with relaxed
    /// identifier/privacy rules and wrapped unchanged.
    Untyped(Box<TNode>),
    /// The fully decoded expression tree returned by a top-level macro
    /// invocation, spliced at the call site.
    MacroSplice(Box<TNode>),
    /// A nested macro call deferred until the enclosing macro executes;
    /// `slot` indexes the delayed-action queue entry that will resolve it.
    DelayCall { slot: usize },
}
