use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Shared, mutable array storage. Cloning the handle aliases the array.
pub type ArrayRef = Rc<RefCell<Vec<Value>>>;

/// Runtime value held on the operand stack, in locals and in the constant
/// pool.
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Void,
    Int(i32),
    Str(String),
    Array(ArrayRef),
}

impl Value {
    pub fn array(items: Vec<Value>) -> Value {
        Value::Array(Rc::new(RefCell::new(items)))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Void => "void",
            Value::Int(_) => "int",
            Value::Str(_) => "string",
            Value::Array(_) => "array",
        }
    }

    /// REPL echo form: like `Display`, but strings are quoted.
    pub fn repr(&self) -> String {
        match self {
            Value::Str(s) => format!("{:?}", s),
            other => other.to_string(),
        }
    }
}

impl PartialEq for Value {
    /// Same tag and same payload; arrays compare by handle identity.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Void, Value::Void) => true,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    /// Rendering used by `print`: arrays recurse as `[1, 2, 3]`. An array
    /// that contains itself is shown as `[...]` where it repeats.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        render(self, f, &mut Vec::new())
    }
}

/// `open` holds the arrays currently being rendered, outermost first.
fn render(
    value: &Value,
    f: &mut fmt::Formatter<'_>,
    open: &mut Vec<*const RefCell<Vec<Value>>>,
) -> fmt::Result {
    match value {
        Value::Void => write!(f, "void"),
        Value::Int(n) => write!(f, "{}", n),
        Value::Str(s) => write!(f, "{}", s),
        Value::Array(items) => {
            let ptr = Rc::as_ptr(items);
            if open.contains(&ptr) {
                return write!(f, "[...]");
            }
            open.push(ptr);
            write!(f, "[")?;
            for (i, item) in items.borrow().iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                render(item, f, open)?;
            }
            open.pop();
            write!(f, "]")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_array_equality_is_identity() {
        let a = Value::array(vec![Value::Int(1)]);
        let b = a.clone();
        let c = Value::array(vec![Value::Int(1)]);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_tags_must_match() {
        assert_ne!(Value::Int(0), Value::Void);
        assert_ne!(Value::Int(1), Value::Str("1".into()));
        assert_eq!(Value::Str("x".into()), Value::Str("x".into()));
    }

    #[test]
    fn test_alias_sees_mutation() {
        let a = Value::array(vec![Value::Int(1), Value::Int(2)]);
        let b = a.clone();
        if let Value::Array(items) = &b {
            items.borrow_mut()[0] = Value::Int(9);
        }
        assert_eq!(a.to_string(), "[9, 2]");
    }

    #[test]
    fn test_display_nested() {
        let v = Value::array(vec![
            Value::Int(1),
            Value::array(vec![Value::Str("a".into()), Value::Void]),
        ]);
        assert_eq!(v.to_string(), "[1, [a, void]]");
        assert_eq!(Value::Str("hi".into()).repr(), "\"hi\"");
        assert_eq!(Value::Int(-3).repr(), "-3");
    }

    #[test]
    fn test_self_referencing_array_display() {
        let a = Value::array(vec![Value::Int(0)]);
        if let Value::Array(items) = &a {
            items.borrow_mut()[0] = a.clone();
        }
        assert_eq!(a.to_string(), "[[...]]");
        assert_eq!(a.repr(), "[[...]]");
    }

    #[test]
    fn test_shared_array_is_not_a_cycle() {
        let inner = Value::array(vec![Value::Int(1)]);
        let outer = Value::array(vec![inner.clone(), inner]);
        assert_eq!(outer.to_string(), "[[1], [1]]");
    }
}
