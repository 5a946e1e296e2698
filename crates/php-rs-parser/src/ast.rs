//! Abstract Syntax Tree node definitions
//!
//! Covers the statement and expression forms the embedded runtime executes,
//! shaped after php-src/Zend/zend_language_parser.y

use php_rs_lexer::Span;

/// Top-level program node containing all statements
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub statements: Vec<Statement>,
}

/// Statement node
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// Expression statement: `expr;`
    Expression { expr: Expression, span: Span },
    /// Echo statement: `echo expr [, expr...];` (also `<?= expr ?>`)
    Echo { exprs: Vec<Expression>, span: Span },
    /// Inline HTML (outside of <?php tags)
    InlineHtml { content: String, span: Span },
    /// Return statement: `return [expr];`
    Return {
        value: Option<Box<Expression>>,
        span: Span,
    },
    /// If/elseif/else statement
    If {
        condition: Box<Expression>,
        then_branch: Box<Statement>,
        elseif_branches: Vec<(Expression, Statement)>,
        else_branch: Option<Box<Statement>>,
        span: Span,
    },
    /// While loop: `while (expr) stmt`
    While {
        condition: Box<Expression>,
        body: Box<Statement>,
        span: Span,
    },
    /// For loop: `for (init; cond; inc) stmt`
    For {
        init: Vec<Expression>,
        condition: Vec<Expression>,
        increment: Vec<Expression>,
        body: Box<Statement>,
        span: Span,
    },
    /// Foreach loop: `foreach (expr as [$key =>] $value) stmt`
    Foreach {
        iterable: Box<Expression>,
        key: Option<Box<Expression>>,
        value: Box<Expression>,
        body: Box<Statement>,
        span: Span,
    },
    /// Break statement: `break [depth];`
    Break { depth: usize, span: Span },
    /// Continue statement: `continue [depth];`
    Continue { depth: usize, span: Span },
    /// Try-catch-finally block
    Try {
        body: Vec<Statement>,
        catches: Vec<CatchClause>,
        finally: Option<Vec<Statement>>,
        span: Span,
    },
    /// Throw statement: `throw expr;`
    Throw {
        exception: Box<Expression>,
        span: Span,
    },
    /// Global declaration: `global $var [, $var...];`
    Global { vars: Vec<String>, span: Span },
    /// Unset statement: `unset($var [, $var...]);`
    Unset { vars: Vec<Expression>, span: Span },
    /// Function declaration
    Function {
        name: String,
        params: Vec<Parameter>,
        body: Vec<Statement>,
        span: Span,
    },
    /// Block statement: `{ statements }`
    Block {
        statements: Vec<Statement>,
        span: Span,
    },
}

/// Expression node
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// Integer literal
    IntLiteral { value: i64, span: Span },
    /// Float literal
    FloatLiteral { value: f64, span: Span },
    /// String literal (escapes already resolved)
    StringLiteral { value: String, span: Span },
    /// Double-quoted string with `$var` interpolation
    Interpolated {
        parts: Vec<StringPart>,
        span: Span,
    },
    /// Boolean literal
    BoolLiteral { value: bool, span: Span },
    /// Null literal
    Null { span: Span },
    /// Variable: `$name`
    Variable { name: String, span: Span },
    /// Bare identifier: a function name when called, a constant otherwise
    Name { name: String, span: Span },
    /// Assignment: `lhs = rhs`
    Assign {
        lhs: Box<Expression>,
        rhs: Box<Expression>,
        span: Span,
    },
    /// Compound assignment: `lhs op= rhs`
    AssignOp {
        op: BinaryOperator,
        lhs: Box<Expression>,
        rhs: Box<Expression>,
        span: Span,
    },
    /// Binary operation: `lhs op rhs`
    BinaryOp {
        op: BinaryOperator,
        lhs: Box<Expression>,
        rhs: Box<Expression>,
        span: Span,
    },
    /// Unary operation: `op expr`
    UnaryOp {
        op: UnaryOperator,
        operand: Box<Expression>,
        span: Span,
    },
    /// Ternary operation: `cond ? then : else`
    Ternary {
        condition: Box<Expression>,
        then_expr: Option<Box<Expression>>, // None for ?: shorthand
        else_expr: Box<Expression>,
        span: Span,
    },
    /// Null coalesce: `lhs ?? rhs`
    Coalesce {
        lhs: Box<Expression>,
        rhs: Box<Expression>,
        span: Span,
    },
    /// Function call: `name(args)` or `$callable(args)`
    FunctionCall {
        name: Box<Expression>,
        args: Vec<Expression>,
        span: Span,
    },
    /// Method call: `object->method(args)` / `object?->method(args)`
    MethodCall {
        object: Box<Expression>,
        method: String,
        args: Vec<Expression>,
        nullsafe: bool,
        span: Span,
    },
    /// Property access: `object->property` / `object?->property`
    PropertyAccess {
        object: Box<Expression>,
        property: String,
        nullsafe: bool,
        span: Span,
    },
    /// Array access: `array[index]`, or `array[]` when pushing
    ArrayAccess {
        array: Box<Expression>,
        index: Option<Box<Expression>>,
        span: Span,
    },
    /// Array literal: `[elements]` or `array(elements)`
    ArrayLiteral {
        elements: Vec<ArrayElement>,
        span: Span,
    },
    /// New object: `new Class(args)`
    New {
        class: String,
        args: Vec<Expression>,
        span: Span,
    },
    /// Instanceof: `expr instanceof Class`
    Instanceof {
        expr: Box<Expression>,
        class: String,
        span: Span,
    },
    /// Cast: `(type) expr`
    Cast {
        cast_type: CastType,
        expr: Box<Expression>,
        span: Span,
    },
    /// Closure: `function(params) use(vars) { body }`
    Closure {
        params: Vec<Parameter>,
        uses: Vec<String>,
        body: Vec<Statement>,
        span: Span,
    },
    /// Arrow function: `fn(params) => expr`
    ArrowFunction {
        params: Vec<Parameter>,
        body: Box<Expression>,
        span: Span,
    },
    /// Isset construct: `isset($var [, $var...])`
    Isset { vars: Vec<Expression>, span: Span },
    /// Empty construct: `empty($var)`
    Empty { var: Box<Expression>, span: Span },
    /// Pre-increment: `++$var`
    PreIncrement { var: Box<Expression>, span: Span },
    /// Post-increment: `$var++`
    PostIncrement { var: Box<Expression>, span: Span },
    /// Pre-decrement: `--$var`
    PreDecrement { var: Box<Expression>, span: Span },
    /// Post-decrement: `$var--`
    PostDecrement { var: Box<Expression>, span: Span },
    /// Print construct: `print expr`
    Print { expr: Box<Expression>, span: Span },
    /// Exit/die construct: `exit([expr])`
    Exit {
        expr: Option<Box<Expression>>,
        span: Span,
    },
}

impl Expression {
    /// Span of the token that starts this expression.
    pub fn span(&self) -> Span {
        match self {
            Expression::IntLiteral { span, .. }
            | Expression::FloatLiteral { span, .. }
            | Expression::StringLiteral { span, .. }
            | Expression::Interpolated { span, .. }
            | Expression::BoolLiteral { span, .. }
            | Expression::Null { span }
            | Expression::Variable { span, .. }
            | Expression::Name { span, .. }
            | Expression::Assign { span, .. }
            | Expression::AssignOp { span, .. }
            | Expression::BinaryOp { span, .. }
            | Expression::UnaryOp { span, .. }
            | Expression::Ternary { span, .. }
            | Expression::Coalesce { span, .. }
            | Expression::FunctionCall { span, .. }
            | Expression::MethodCall { span, .. }
            | Expression::PropertyAccess { span, .. }
            | Expression::ArrayAccess { span, .. }
            | Expression::ArrayLiteral { span, .. }
            | Expression::New { span, .. }
            | Expression::Instanceof { span, .. }
            | Expression::Cast { span, .. }
            | Expression::Closure { span, .. }
            | Expression::ArrowFunction { span, .. }
            | Expression::Isset { span, .. }
            | Expression::Empty { span, .. }
            | Expression::PreIncrement { span, .. }
            | Expression::PostIncrement { span, .. }
            | Expression::PreDecrement { span, .. }
            | Expression::PostDecrement { span, .. }
            | Expression::Print { span, .. }
            | Expression::Exit { span, .. } => *span,
        }
    }
}

/// Piece of an interpolated string
#[derive(Debug, Clone, PartialEq)]
pub enum StringPart {
    Literal(String),
    Expr(Expression),
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOperator {
    // Arithmetic
    Add, // +
    Sub, // -
    Mul, // *
    Div, // /
    Mod, // %
    Pow, // **
    // String
    Concat, // .
    // Comparison
    Equal,        // ==
    NotEqual,     // !=
    Identical,    // ===
    NotIdentical, // !==
    Less,         // <
    LessEqual,    // <=
    Greater,      // >
    GreaterEqual, // >=
    Spaceship,    // <=>
    // Logical
    And,        // &&
    Or,         // ||
    LogicalAnd, // and
    LogicalOr,  // or
    LogicalXor, // xor
    // Bitwise
    BitwiseAnd, // &
    BitwiseOr,  // |
    BitwiseXor, // ^
    // Only valid as the operator of AssignOp
    Coalesce, // ??=
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOperator {
    Plus,          // +
    Minus,         // -
    Not,           // !
    BitwiseNot,    // ~
    ErrorSuppress, // @
}

/// Cast types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CastType {
    Int,
    Float,
    String,
    Bool,
    Array,
}

/// Array element in array literal
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayElement {
    pub key: Option<Expression>,
    pub value: Expression,
}

/// Parameter in function declaration
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub default: Option<Expression>,
    pub span: Span,
}

/// `catch (Type1 | Type2 $var) { ... }`
#[derive(Debug, Clone, PartialEq)]
pub struct CatchClause {
    pub types: Vec<String>,
    pub var: Option<String>,
    pub body: Vec<Statement>,
    pub span: Span,
}
