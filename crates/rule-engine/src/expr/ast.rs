//! Expression tree.

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Literal {
    None,
    Bool(bool),
    Num(f64),
    Str(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
    Is,
    IsNot,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr {
    Literal(Literal),
    Name(String),
    /// List and tuple literals
    List(Vec<Expr>),
    Index {
        target: Box<Expr>,
        key: Box<Expr>,
    },
    Attr {
        target: Box<Expr>,
        name: String,
    },
    Call {
        target: Box<Expr>,
        method: String,
        args: Vec<Expr>,
    },
    Not(Box<Expr>),
    And(Vec<Expr>),
    Or(Vec<Expr>),
    /// `left op1 e1 op2 e2 ...`, chained the way Python chains comparisons
    Compare {
        left: Box<Expr>,
        rest: Vec<(CmpOp, Expr)>,
    },
}
