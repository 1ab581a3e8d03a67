//! Abstract syntax tree.
//!
//! The tree is also the bytecode payload, so every node is serde-encodable.

use std::cell::Cell;
use std::sync::Arc;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};

use super::token::Span;

/// Deepest statement/expression nesting the parser accepts.
pub const MAX_NESTING: usize = 64;

/// Deepest node nesting accepted when decoding a program. Parsed programs
/// stay inside it.
pub const MAX_DECODE_DEPTH: usize = MAX_NESTING * 3;

thread_local! {
    static DECODE_DEPTH: Cell<usize> = const { Cell::new(0) };
}

/// One level of node nesting while decoding.
struct DecodeDepth;

impl DecodeDepth {
    fn enter() -> Option<DecodeDepth> {
        DECODE_DEPTH.with(|depth| {
            let next = depth.get() + 1;
            if next > MAX_DECODE_DEPTH {
                return None;
            }
            depth.set(next);
            Some(DecodeDepth)
        })
    }
}

impl Drop for DecodeDepth {
    fn drop(&mut self) {
        DECODE_DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

/// Decode a node that may contain further statements or expressions.
fn nested<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    let Some(_level) = DecodeDepth::enter() else {
        return Err(D::Error::custom(format!(
            "program nests deeper than {} nodes",
            MAX_DECODE_DEPTH
        )));
    };
    T::deserialize(deserializer)
}

/// Program node - the root of the AST.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Program {
    pub body: Vec<Statement>,
    /// Names declared with `var` or as functions, hoisted onto the global
    /// object before the body runs.
    pub var_names: Vec<String>,
    pub span: Span,
}

/// Statement node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Statement {
    /// Empty statement (;)
    Empty(Span),
    #[serde(deserialize_with = "nested")]
    Expression(ExpressionStmt),
    #[serde(deserialize_with = "nested")]
    Block(BlockStmt),
    #[serde(deserialize_with = "nested")]
    Variable(VariableDecl),
    #[serde(deserialize_with = "nested")]
    If(IfStmt),
    #[serde(deserialize_with = "nested")]
    For(ForStmt),
    #[serde(deserialize_with = "nested")]
    ForIn(ForInStmt),
    #[serde(deserialize_with = "nested")]
    While(WhileStmt),
    #[serde(deserialize_with = "nested")]
    DoWhile(DoWhileStmt),
    #[serde(deserialize_with = "nested")]
    Switch(SwitchStmt),
    Break(JumpStmt),
    Continue(JumpStmt),
    #[serde(deserialize_with = "nested")]
    Return(ReturnStmt),
    #[serde(deserialize_with = "nested")]
    Throw(ThrowStmt),
    #[serde(deserialize_with = "nested")]
    Try(TryStmt),
    #[serde(deserialize_with = "nested")]
    Labeled(LabeledStmt),
    Debugger(Span),
    #[serde(deserialize_with = "nested")]
    Function(Arc<FunctionNode>),
}

impl Statement {
    /// Whether the statement introduces a block-scoped binding.
    pub fn is_lexical_declaration(&self) -> bool {
        matches!(self, Statement::Variable(decl) if decl.kind != VariableKind::Var)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpressionStmt {
    pub expression: Expression,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockStmt {
    pub body: Vec<Statement>,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariableDecl {
    pub kind: VariableKind,
    pub declarations: Vec<VariableDeclarator>,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VariableKind {
    Var,
    Let,
    Const,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariableDeclarator {
    pub id: Identifier,
    pub init: Option<Expression>,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IfStmt {
    pub test: Expression,
    pub consequent: Box<Statement>,
    pub alternate: Option<Box<Statement>>,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForStmt {
    pub init: Option<ForInit>,
    pub test: Option<Expression>,
    pub update: Option<Expression>,
    pub body: Box<Statement>,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ForInit {
    Variable(VariableDecl),
    Expression(Expression),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForInStmt {
    pub left: ForInLeft,
    pub right: Expression,
    pub body: Box<Statement>,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ForInLeft {
    Declaration(VariableKind, Identifier),
    /// An identifier or member expression.
    Target(Expression),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhileStmt {
    pub test: Expression,
    pub body: Box<Statement>,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoWhileStmt {
    pub body: Box<Statement>,
    pub test: Expression,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwitchStmt {
    pub discriminant: Expression,
    pub cases: Vec<SwitchCase>,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwitchCase {
    /// `None` for `default:`.
    pub test: Option<Expression>,
    pub consequent: Vec<Statement>,
    pub span: Span,
}

/// `break` or `continue`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JumpStmt {
    pub label: Option<String>,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnStmt {
    pub argument: Option<Expression>,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThrowStmt {
    pub argument: Expression,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TryStmt {
    pub block: BlockStmt,
    pub handler: Option<CatchClause>,
    pub finalizer: Option<BlockStmt>,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatchClause {
    pub param: Option<Identifier>,
    pub body: BlockStmt,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabeledStmt {
    pub label: String,
    pub body: Box<Statement>,
    pub span: Span,
}

/// Function declaration, expression or arrow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionNode {
    pub id: Option<Identifier>,
    pub params: Vec<Identifier>,
    pub body: Vec<Statement>,
    pub is_arrow: bool,
    /// `var` and nested function names to hoist into the call scope.
    pub var_names: Vec<String>,
    /// The body mentions `arguments`, so the call must materialise it.
    pub uses_arguments: bool,
    pub span: Span,
}

impl FunctionNode {
    pub fn name(&self) -> &str {
        self.id.as_ref().map_or("", |id| id.name.as_str())
    }
}

/// Expression node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Expression {
    Identifier(Identifier),
    Literal(Literal, Span),
    RegExp(RegExpLiteral),
    #[serde(deserialize_with = "nested")]
    Array(ArrayExpr),
    #[serde(deserialize_with = "nested")]
    Object(ObjectExpr),
    #[serde(deserialize_with = "nested")]
    Function(Arc<FunctionNode>),
    #[serde(deserialize_with = "nested")]
    Unary(UnaryExpr),
    #[serde(deserialize_with = "nested")]
    Update(UpdateExpr),
    #[serde(deserialize_with = "nested")]
    Binary(BinaryExpr),
    #[serde(deserialize_with = "nested")]
    Logical(LogicalExpr),
    #[serde(deserialize_with = "nested")]
    Conditional(ConditionalExpr),
    #[serde(deserialize_with = "nested")]
    Assignment(AssignmentExpr),
    #[serde(deserialize_with = "nested")]
    Sequence(SequenceExpr),
    #[serde(deserialize_with = "nested")]
    Member(MemberExpr),
    #[serde(deserialize_with = "nested")]
    Call(CallExpr),
    #[serde(deserialize_with = "nested")]
    New(NewExpr),
    This(Span),
}

impl Expression {
    pub fn span(&self) -> Span {
        match self {
            Expression::Identifier(id) => id.span,
            Expression::Literal(_, span) | Expression::This(span) => *span,
            Expression::RegExp(e) => e.span,
            Expression::Array(e) => e.span,
            Expression::Object(e) => e.span,
            Expression::Function(f) => f.span,
            Expression::Unary(e) => e.span,
            Expression::Update(e) => e.span,
            Expression::Binary(e) => e.span,
            Expression::Logical(e) => e.span,
            Expression::Conditional(e) => e.span,
            Expression::Assignment(e) => e.span,
            Expression::Sequence(e) => e.span,
            Expression::Member(e) => e.span,
            Expression::Call(e) => e.span,
            Expression::New(e) => e.span,
        }
    }

    /// Whether the expression may appear on the left of `=`.
    pub fn is_assignment_target(&self) -> bool {
        matches!(self, Expression::Identifier(_) | Expression::Member(_))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identifier {
    pub name: String,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    Null,
    Boolean(bool),
    Number(f64),
    String(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegExpLiteral {
    pub pattern: String,
    pub flags: String,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArrayExpr {
    /// `None` marks an elision hole.
    pub elements: Vec<Option<Expression>>,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectExpr {
    pub properties: Vec<ObjectProperty>,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectProperty {
    pub key: PropertyName,
    pub value: Expression,
    pub span: Span,
}

/// Property name after `.` or in an object literal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PropertyName {
    Named(String),
    Computed(Box<Expression>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnaryExpr {
    pub operator: UnaryOp,
    pub argument: Box<Expression>,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Minus,
    Plus,
    Not,
    BitNot,
    Typeof,
    Void,
    Delete,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateExpr {
    pub operator: UpdateOp,
    pub argument: Box<Expression>,
    pub prefix: bool,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdateOp {
    Increment,
    Decrement,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BinaryExpr {
    pub operator: BinaryOp,
    pub left: Box<Expression>,
    pub right: Box<Expression>,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Exp,
    Equal,
    NotEqual,
    StrictEqual,
    StrictNotEqual,
    LessThan,
    LessEqual,
    GreaterThan,
    GreaterEqual,
    LeftShift,
    RightShift,
    UnsignedRightShift,
    BitAnd,
    BitOr,
    BitXor,
    In,
    Instanceof,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogicalExpr {
    pub operator: LogicalOp,
    pub left: Box<Expression>,
    pub right: Box<Expression>,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogicalOp {
    And,
    Or,
    Nullish,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionalExpr {
    pub test: Box<Expression>,
    pub consequent: Box<Expression>,
    pub alternate: Box<Expression>,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentExpr {
    pub operator: AssignmentOp,
    /// An identifier or member expression.
    pub target: Box<Expression>,
    pub value: Box<Expression>,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssignmentOp {
    Assign,
    /// `op=` for an arithmetic, shift or bitwise operator.
    Compound(BinaryOp),
    /// `&&=`, `||=` and `??=`.
    Logical(LogicalOp),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequenceExpr {
    pub expressions: Vec<Expression>,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberExpr {
    pub object: Box<Expression>,
    pub property: PropertyName,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallExpr {
    pub callee: Box<Expression>,
    pub arguments: Vec<Expression>,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewExpr {
    pub callee: Box<Expression>,
    pub arguments: Vec<Expression>,
    pub span: Span,
}
