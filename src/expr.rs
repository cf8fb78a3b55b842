//! Temporal expressions.
//!
//! An [`Expr`] is an immutable operator tree shared by reference
//! counting. Building one allocates nothing per evaluation; each
//! evaluation spawns fresh tasks that walk the shared tree.
//!
//! The operator algebra is exposed through `std::ops` so expressions read
//! the way they are written about: `a + b` concatenates, `a / b` fuses,
//! `a | b` alternates, `a ^ b` intersects, `a & b` conjoins, `a * 3` and
//! `a * (2, 4)` repeat, `a >> b` is the conditional, and `!a` inverts
//! (Rust has no unary `~`). Filters are the [`Expr::first_of`] and
//! [`Expr::once`] methods.
//!
//! # Examples
//!
//! ```
//! use oroboro::Expr;
//!
//! let req = Expr::pred("req", || true);
//! let ack = Expr::pred("ack", || false);
//!
//! // "after req, ack stays low for two cycles and then rises"
//! let expr = req >> (!ack.clone() + !ack.clone() + ack);
//! assert_eq!(format!("{expr}"), "(req >> ((~ack + ~ack) + ack))");
//! ```

use std::fmt;
use std::rc::Rc;

use crate::error::ValidationError;

/// A pure, non-blocking inspector of ambient host state.
///
/// Predicates must not call back into the engine and must not suspend;
/// both are contract violations with undefined results.
pub(crate) type PredFn = Rc<dyn Fn() -> bool>;

/// Operator nodes of the expression tree.
pub(crate) enum ExprNode {
    Pred { label: Rc<str>, test: PredFn },
    Concat { left: Expr, right: Expr },
    Fuse { left: Expr, right: Expr },
    Alt { left: Expr, right: Expr },
    Inter { left: Expr, right: Expr },
    Conj { left: Expr, right: Expr },
    Repeat { inner: Expr, min: u32, max: u32 },
    Cond { antecedent: Expr, consequent: Expr },
    Inv { inner: Expr },
    FirstOf { inner: Expr },
    Once { inner: Expr },
}

/// An immutable, cheaply clonable temporal expression.
#[derive(Clone)]
pub struct Expr {
    pub(crate) node: Rc<ExprNode>,
}

impl Expr {
    fn wrap(node: ExprNode) -> Self {
        Self {
            node: Rc::new(node),
        }
    }

    /// A predicate expression. `label` identifies the predicate in
    /// traces; `test` inspects host state at a single cycle.
    pub fn pred(label: impl Into<Rc<str>>, test: impl Fn() -> bool + 'static) -> Self {
        Self::wrap(ExprNode::Pred {
            label: label.into(),
            test: Rc::new(test),
        })
    }

    /// Concatenation: `other` starts one cycle after each match of
    /// `self`. Also available as `self + other`.
    #[must_use]
    pub fn then(self, other: Expr) -> Self {
        Self::wrap(ExprNode::Concat {
            left: self,
            right: other,
        })
    }

    /// Fusion: `other` starts at the same cycle each match of `self`
    /// ends. Also available as `self / other`.
    #[must_use]
    pub fn fuse(self, other: Expr) -> Self {
        Self::wrap(ExprNode::Fuse {
            left: self,
            right: other,
        })
    }

    /// Alternation: both sides evaluate from the same start cycle and
    /// every match of either is forwarded. Also available as
    /// `self | other`.
    #[must_use]
    pub fn or(self, other: Expr) -> Self {
        Self::wrap(ExprNode::Alt {
            left: self,
            right: other,
        })
    }

    /// Intersection: pairs every match of one side with every
    /// earlier-or-equal-ending match of the other. Also available as
    /// `self ^ other`.
    #[must_use]
    pub fn intersect(self, other: Expr) -> Self {
        Self::wrap(ExprNode::Inter {
            left: self,
            right: other,
        })
    }

    /// Conjunction: matches only when both sides match ending at the
    /// same cycle. Also available as `self & other`.
    #[must_use]
    pub fn and(self, other: Expr) -> Self {
        Self::wrap(ExprNode::Conj {
            left: self,
            right: other,
        })
    }

    /// Repetition of `min..=max` chained evaluations. Also available as
    /// `self * n` and `self * (min, max)`.
    ///
    /// # Errors
    ///
    /// `InvalidRepeatCount` for `min == 0`, `InvalidRepeatRange` for
    /// `min > max`.
    pub fn repeat(self, min: u32, max: u32) -> Result<Self, ValidationError> {
        if min == 0 {
            return Err(ValidationError::InvalidRepeatCount { count: min });
        }
        if min > max {
            return Err(ValidationError::InvalidRepeatRange { min, max });
        }
        Ok(self.repeat_unchecked(min, max))
    }

    /// Exactly `n` chained evaluations.
    ///
    /// # Errors
    ///
    /// `InvalidRepeatCount` for `n == 0`.
    pub fn times(self, n: u32) -> Result<Self, ValidationError> {
        self.repeat(n, n)
    }

    fn repeat_unchecked(self, min: u32, max: u32) -> Self {
        Self::wrap(ExprNode::Repeat {
            inner: self,
            min,
            max,
        })
    }

    /// Conditional: each match of the antecedent obliges `consequent` to
    /// hold from the following cycle; a failed antecedent is a vacuous
    /// match. Also available as `self >> other`.
    #[must_use]
    pub fn implies(self, consequent: Expr) -> Self {
        Self::wrap(ExprNode::Cond {
            antecedent: self,
            consequent,
        })
    }

    /// Inversion: matches become failures and the failure becomes a
    /// match. Also available as `!self`.
    #[must_use]
    pub fn invert(self) -> Self {
        Self::wrap(ExprNode::Inv { inner: self })
    }

    /// Filter: forward only the first match, then stop the inner
    /// evaluation. Failures pass through unchanged.
    #[must_use]
    pub fn first_of(self) -> Self {
        Self::wrap(ExprNode::FirstOf { inner: self })
    }

    /// Filter: forward at most one match per distinct end cycle, without
    /// stopping the inner evaluation. Failures pass through unchanged.
    #[must_use]
    pub fn once(self) -> Self {
        Self::wrap(ExprNode::Once { inner: self })
    }
}

impl std::ops::Add for Expr {
    type Output = Expr;

    fn add(self, rhs: Expr) -> Expr {
        self.then(rhs)
    }
}

impl std::ops::Div for Expr {
    type Output = Expr;

    fn div(self, rhs: Expr) -> Expr {
        self.fuse(rhs)
    }
}

impl std::ops::BitOr for Expr {
    type Output = Expr;

    fn bitor(self, rhs: Expr) -> Expr {
        self.or(rhs)
    }
}

impl std::ops::BitXor for Expr {
    type Output = Expr;

    fn bitxor(self, rhs: Expr) -> Expr {
        self.intersect(rhs)
    }
}

impl std::ops::BitAnd for Expr {
    type Output = Expr;

    fn bitand(self, rhs: Expr) -> Expr {
        self.and(rhs)
    }
}

impl std::ops::Shr for Expr {
    type Output = Expr;

    fn shr(self, rhs: Expr) -> Expr {
        self.implies(rhs)
    }
}

impl std::ops::Not for Expr {
    type Output = Expr;

    fn not(self) -> Expr {
        self.invert()
    }
}

impl std::ops::Mul<u32> for Expr {
    type Output = Expr;

    /// # Panics
    ///
    /// Panics if `n` is zero; use [`Expr::times`] for a fallible form.
    fn mul(self, n: u32) -> Expr {
        assert!(n >= 1, "repeat count must be at least 1");
        self.repeat_unchecked(n, n)
    }
}

impl std::ops::Mul<(u32, u32)> for Expr {
    type Output = Expr;

    /// # Panics
    ///
    /// Panics on an empty or zero-based range; use [`Expr::repeat`] for a
    /// fallible form.
    fn mul(self, (min, max): (u32, u32)) -> Expr {
        assert!(min >= 1, "repeat count must be at least 1");
        assert!(min <= max, "repeat range must satisfy min <= max");
        self.repeat_unchecked(min, max)
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.node {
            ExprNode::Pred { label, .. } => write!(f, "{label}"),
            ExprNode::Concat { left, right } => write!(f, "({left} + {right})"),
            ExprNode::Fuse { left, right } => write!(f, "({left} / {right})"),
            ExprNode::Alt { left, right } => write!(f, "({left} | {right})"),
            ExprNode::Inter { left, right } => write!(f, "({left} ^ {right})"),
            ExprNode::Conj { left, right } => write!(f, "({left} & {right})"),
            ExprNode::Repeat { inner, min, max } if min == max => {
                write!(f, "({inner} * {min})")
            }
            ExprNode::Repeat { inner, min, max } => write!(f, "({inner} * ({min},{max}))"),
            ExprNode::Cond {
                antecedent,
                consequent,
            } => write!(f, "({antecedent} >> {consequent})"),
            ExprNode::Inv { inner } => write!(f, "~{inner}"),
            ExprNode::FirstOf { inner } => write!(f, "firstof({inner})"),
            ExprNode::Once { inner } => write!(f, "once({inner})"),
        }
    }
}

impl fmt::Debug for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Expr({self})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(label: &str) -> Expr {
        Expr::pred(label, || true)
    }

    #[test]
    fn display_forms() {
        let e = (p("a") + p("b")) | p("c");
        assert_eq!(format!("{e}"), "((a + b) | c)");

        let e = p("a") / p("b");
        assert_eq!(format!("{e}"), "(a / b)");

        let e = p("a") ^ (p("b") & p("c"));
        assert_eq!(format!("{e}"), "(a ^ (b & c))");

        let e = !p("a") * (2, 3);
        assert_eq!(format!("{e}"), "(~a * (2,3))");

        let e = p("a") * 4;
        assert_eq!(format!("{e}"), "(a * 4)");

        let e = p("a").first_of().once();
        assert_eq!(format!("{e}"), "once(firstof(a))");
    }

    #[test]
    fn repeat_validation() {
        assert!(matches!(
            p("a").repeat(0, 3),
            Err(ValidationError::InvalidRepeatCount { count: 0 })
        ));
        assert!(matches!(
            p("a").repeat(3, 2),
            Err(ValidationError::InvalidRepeatRange { min: 3, max: 2 })
        ));
        assert!(p("a").repeat(1, 1).is_ok());
        assert!(p("a").times(2).is_ok());
    }

    #[test]
    #[should_panic(expected = "repeat count must be at least 1")]
    fn mul_zero_panics() {
        let _ = p("a") * 0;
    }

    #[test]
    #[should_panic(expected = "min <= max")]
    fn mul_bad_range_panics() {
        let _ = p("a") * (3, 2);
    }

    #[test]
    fn clones_share_structure() {
        let a = p("a");
        let b = a.clone();
        assert!(Rc::ptr_eq(&a.node, &b.node));
    }
}
