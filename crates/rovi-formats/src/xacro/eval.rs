//! Expression evaluation for `${...}` substitution blocks

use std::cmp::Ordering;
use std::fmt;

/// An evaluated expression value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(f64),
    Str(String),
    Bool(bool),
}

impl Value {
    /// Interpret free text the way property values behave: numeric text
    /// acts as a number, anything else stays a string.
    pub fn from_text(text: &str) -> Value {
        match text.trim().parse::<f64>() {
            Ok(n) => Value::Number(n),
            Err(_) => Value::Str(text.to_string()),
        }
    }

    pub fn as_number(&self) -> Result<f64, EvalError> {
        match self {
            Value::Number(n) => Ok(*n),
            Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
            Value::Str(s) => s
                .trim()
                .parse()
                .map_err(|_| EvalError::Type(format!("'{s}' is not a number"))),
        }
    }

    /// Truthiness used by conditional attributes.
    pub fn as_bool(&self) -> Result<bool, EvalError> {
        match self {
            Value::Bool(b) => Ok(*b),
            Value::Number(n) => Ok(*n != 0.0),
            Value::Str(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" => Ok(true),
                "false" | "0" | "" => Ok(false),
                other => other
                    .parse::<f64>()
                    .map(|n| n != 0.0)
                    .map_err(|_| EvalError::Type(format!("'{s}' is not a truth value"))),
            },
        }
    }

    /// Equality across types: booleans compare against the string and
    /// numeric spellings documents actually use.
    fn loosely_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Bool(b), Value::Str(s)) | (Value::Str(s), Value::Bool(b)) => matches!(
                (s.trim().to_ascii_lowercase().as_str(), b),
                ("true" | "1", true) | ("false" | "0", false)
            ),
            (Value::Bool(b), Value::Number(n)) | (Value::Number(n), Value::Bool(b)) => {
                (*b as i64 as f64) == *n
            }
            (Value::Number(n), Value::Str(s)) | (Value::Str(s), Value::Number(n)) => {
                s.trim().parse::<f64>().is_ok_and(|v| v == *n)
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    write!(f, "{}", *n as i64)
                } else {
                    write!(f, "{n}")
                }
            }
            Value::Str(s) => write!(f, "{s}"),
            Value::Bool(b) => write!(f, "{}", if *b { "True" } else { "False" }),
        }
    }
}

/// Name resolution for identifiers appearing in expressions.
pub trait Lookup {
    fn lookup(&self, name: &str) -> Option<Value>;
}

/// Evaluate an expression against a property scope.
pub fn eval(expr: &str, scope: &dyn Lookup) -> Result<Value, EvalError> {
    let tokens = tokenize(expr)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        scope,
    };
    let value = parser.or_expr()?;
    if parser.pos != parser.tokens.len() {
        return Err(EvalError::Syntax(format!(
            "unexpected trailing input in '{expr}'"
        )));
    }
    Ok(value)
}

// ============== Tokenizer ==============

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Str(String),
    Ident(String),
    Op(&'static str),
}

fn tokenize(expr: &str) -> Result<Vec<Token>, EvalError> {
    let chars: Vec<char> = expr.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '\'' | '"' => {
                let mut j = i + 1;
                while j < chars.len() && chars[j] != c {
                    j += 1;
                }
                if j == chars.len() {
                    return Err(EvalError::Syntax(format!("unterminated string in '{expr}'")));
                }
                tokens.push(Token::Str(chars[i + 1..j].iter().collect()));
                i = j + 1;
            }
            c if c.is_ascii_digit()
                || (c == '.' && chars.get(i + 1).is_some_and(char::is_ascii_digit)) =>
            {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_ascii_digit()
                        || chars[i] == '.'
                        || chars[i] == 'e'
                        || chars[i] == 'E'
                        || ((chars[i] == '+' || chars[i] == '-')
                            && (chars[i - 1] == 'e' || chars[i - 1] == 'E')))
                {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let n = text
                    .parse()
                    .map_err(|_| EvalError::Syntax(format!("bad number '{text}'")))?;
                tokens.push(Token::Number(n));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            '=' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Op("=="));
                i += 2;
            }
            '!' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Op("!="));
                i += 2;
            }
            '<' | '>' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Op(if c == '<' { "<=" } else { ">=" }));
                    i += 2;
                } else {
                    tokens.push(Token::Op(if c == '<' { "<" } else { ">" }));
                    i += 1;
                }
            }
            '+' | '-' | '*' | '/' | '%' | '(' | ')' | ',' => {
                tokens.push(Token::Op(match c {
                    '+' => "+",
                    '-' => "-",
                    '*' => "*",
                    '/' => "/",
                    '%' => "%",
                    '(' => "(",
                    ')' => ")",
                    _ => ",",
                }));
                i += 1;
            }
            other => {
                return Err(EvalError::Syntax(format!(
                    "unexpected character '{other}' in '{expr}'"
                )));
            }
        }
    }
    Ok(tokens)
}

// ============== Parser ==============

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    scope: &'a dyn Lookup,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat_op(&mut self, op: &str) -> bool {
        if matches!(self.peek(), Some(Token::Op(o)) if *o == op) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_op(&mut self, op: &'static str) -> Result<(), EvalError> {
        if self.eat_op(op) {
            Ok(())
        } else {
            Err(EvalError::Syntax(format!("expected '{op}'")))
        }
    }

    fn eat_keyword(&mut self, word: &str) -> bool {
        if matches!(self.peek(), Some(Token::Ident(k)) if k == word) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn or_expr(&mut self) -> Result<Value, EvalError> {
        let mut left = self.and_expr()?;
        while self.eat_keyword("or") {
            let right = self.and_expr()?;
            left = Value::Bool(left.as_bool()? || right.as_bool()?);
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<Value, EvalError> {
        let mut left = self.not_expr()?;
        while self.eat_keyword("and") {
            let right = self.not_expr()?;
            left = Value::Bool(left.as_bool()? && right.as_bool()?);
        }
        Ok(left)
    }

    fn not_expr(&mut self) -> Result<Value, EvalError> {
        if self.eat_keyword("not") {
            let value = self.not_expr()?;
            return Ok(Value::Bool(!value.as_bool()?));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Value, EvalError> {
        let left = self.additive()?;
        let op = match self.peek() {
            Some(Token::Op(op @ ("==" | "!=" | "<" | "<=" | ">" | ">="))) => *op,
            _ => return Ok(left),
        };
        self.pos += 1;
        let right = self.additive()?;
        let result = match op {
            "==" => left.loosely_equals(&right),
            "!=" => !left.loosely_equals(&right),
            op => {
                let ord = compare_order(&left, &right)?;
                matches!(
                    (op, ord),
                    ("<", Ordering::Less)
                        | ("<=", Ordering::Less | Ordering::Equal)
                        | (">", Ordering::Greater)
                        | (">=", Ordering::Greater | Ordering::Equal)
                )
            }
        };
        Ok(Value::Bool(result))
    }

    fn additive(&mut self) -> Result<Value, EvalError> {
        let mut left = self.term()?;
        loop {
            if self.eat_op("+") {
                let right = self.term()?;
                left = match (&left, &right) {
                    (Value::Str(a), Value::Str(b)) => Value::Str(format!("{a}{b}")),
                    _ => Value::Number(left.as_number()? + right.as_number()?),
                };
            } else if self.eat_op("-") {
                let right = self.term()?;
                left = Value::Number(left.as_number()? - right.as_number()?);
            } else {
                return Ok(left);
            }
        }
    }

    fn term(&mut self) -> Result<Value, EvalError> {
        let mut left = self.factor()?;
        loop {
            if self.eat_op("*") {
                let right = self.factor()?;
                left = Value::Number(left.as_number()? * right.as_number()?);
            } else if self.eat_op("/") {
                let right = self.factor()?;
                left = Value::Number(left.as_number()? / right.as_number()?);
            } else if self.eat_op("%") {
                let right = self.factor()?;
                left = Value::Number(left.as_number()? % right.as_number()?);
            } else {
                return Ok(left);
            }
        }
    }

    fn factor(&mut self) -> Result<Value, EvalError> {
        if self.eat_op("-") {
            let value = self.factor()?;
            return Ok(Value::Number(-value.as_number()?));
        }
        if self.eat_op("+") {
            let value = self.factor()?;
            return Ok(Value::Number(value.as_number()?));
        }
        self.atom()
    }

    fn atom(&mut self) -> Result<Value, EvalError> {
        match self.bump() {
            Some(Token::Number(n)) => Ok(Value::Number(n)),
            Some(Token::Str(s)) => Ok(Value::Str(s)),
            Some(Token::Op("(")) => {
                let value = self.or_expr()?;
                self.expect_op(")")?;
                Ok(value)
            }
            Some(Token::Ident(name)) => {
                if self.peek() == Some(&Token::Op("(")) {
                    self.pos += 1;
                    let args = self.call_args()?;
                    apply_function(&name, &args)
                } else {
                    self.scope
                        .lookup(&name)
                        .ok_or(EvalError::Undefined(name))
                }
            }
            _ => Err(EvalError::Syntax("expected a value".into())),
        }
    }

    fn call_args(&mut self) -> Result<Vec<Value>, EvalError> {
        let mut args = Vec::new();
        if self.eat_op(")") {
            return Ok(args);
        }
        loop {
            args.push(self.or_expr()?);
            if self.eat_op(")") {
                return Ok(args);
            }
            self.expect_op(",")?;
        }
    }
}

fn compare_order(left: &Value, right: &Value) -> Result<Ordering, EvalError> {
    if let (Value::Str(a), Value::Str(b)) = (left, right) {
        return Ok(a.cmp(b));
    }
    let (a, b) = (left.as_number()?, right.as_number()?);
    a.partial_cmp(&b)
        .ok_or_else(|| EvalError::Type("unordered comparison".into()))
}

fn apply_function(name: &str, args: &[Value]) -> Result<Value, EvalError> {
    let unary = |f: fn(f64) -> f64| match args {
        [v] => Ok(Value::Number(f(v.as_number()?))),
        _ => Err(EvalError::Type(format!("{name} takes one argument"))),
    };
    match name {
        "sin" => unary(f64::sin),
        "cos" => unary(f64::cos),
        "tan" => unary(f64::tan),
        "asin" => unary(f64::asin),
        "acos" => unary(f64::acos),
        "atan" => unary(f64::atan),
        "sqrt" => unary(f64::sqrt),
        "abs" => unary(f64::abs),
        "floor" => unary(f64::floor),
        "ceil" => unary(f64::ceil),
        "radians" => unary(f64::to_radians),
        "degrees" => unary(f64::to_degrees),
        "atan2" => match args {
            [y, x] => Ok(Value::Number(y.as_number()?.atan2(x.as_number()?))),
            _ => Err(EvalError::Type("atan2 takes two arguments".into())),
        },
        "pow" => match args {
            [base, exp] => Ok(Value::Number(base.as_number()?.powf(exp.as_number()?))),
            _ => Err(EvalError::Type("pow takes two arguments".into())),
        },
        "min" | "max" => {
            let mut numbers = Vec::with_capacity(args.len());
            for arg in args {
                numbers.push(arg.as_number()?);
            }
            let Some(&first) = numbers.first() else {
                return Err(EvalError::Type(format!("{name} needs at least one argument")));
            };
            let best = numbers[1..].iter().fold(first, |acc, &n| {
                if name == "min" { acc.min(n) } else { acc.max(n) }
            });
            Ok(Value::Number(best))
        }
        _ => Err(EvalError::Undefined(format!("function {name}"))),
    }
}

// ============== Errors ==============

/// Expression evaluation failures.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvalError {
    #[error("syntax error: {0}")]
    Syntax(String),
    #[error("undefined name: {0}")]
    Undefined(String),
    #[error("type error: {0}")]
    Type(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::collections::HashMap;

    struct Env(HashMap<String, Value>);

    impl Lookup for Env {
        fn lookup(&self, name: &str) -> Option<Value> {
            self.0.get(name).cloned()
        }
    }

    fn env(pairs: &[(&str, Value)]) -> Env {
        Env(pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect())
    }

    fn num(expr: &str, scope: &Env) -> f64 {
        eval(expr, scope).unwrap().as_number().unwrap()
    }

    #[test]
    fn test_arithmetic_precedence() {
        let empty = env(&[]);
        assert_relative_eq!(num("1 + 2 * 3 - 4 / 8", &empty), 6.5);
        assert_relative_eq!(num("(1 + 2) * 3", &empty), 9.0);
        assert_relative_eq!(num("2 * -3", &empty), -6.0);
    }

    #[test]
    fn test_property_lookup_divides() {
        let scope = env(&[("width", Value::from_text("0.5"))]);
        assert_relative_eq!(num("width / 2", &scope), 0.25);
    }

    #[test]
    fn test_comparisons_and_boolean_operators() {
        let empty = env(&[]);
        assert_eq!(eval("1 < 2 and 3 >= 3", &empty).unwrap(), Value::Bool(true));
        assert_eq!(eval("not (1 == 2)", &empty).unwrap(), Value::Bool(true));
        assert_eq!(eval("1 > 2 or 0 != 0", &empty).unwrap(), Value::Bool(false));
    }

    #[test]
    fn test_string_concat_and_equality() {
        let empty = env(&[]);
        assert_eq!(eval("'a' + 'b' == 'ab'", &empty).unwrap(), Value::Bool(true));
    }

    #[test]
    fn test_boolean_compares_against_string_spelling() {
        let scope = env(&[("flag", Value::Bool(true))]);
        assert_eq!(eval("flag == 'true'", &scope).unwrap(), Value::Bool(true));
        assert_eq!(eval("flag == 'false'", &scope).unwrap(), Value::Bool(false));
    }

    #[test]
    fn test_functions() {
        let empty = env(&[]);
        assert_relative_eq!(num("radians(180)", &empty), std::f64::consts::PI);
        assert_relative_eq!(num("atan2(1, 1)", &empty), std::f64::consts::FRAC_PI_4);
        assert_relative_eq!(num("max(1, 5, 3)", &empty), 5.0);
        assert_relative_eq!(num("min(4, 2)", &empty), 2.0);
    }

    #[test]
    fn test_undefined_name_errors() {
        let empty = env(&[]);
        assert!(matches!(
            eval("missing", &empty),
            Err(EvalError::Undefined(_))
        ));
    }

    #[test]
    fn test_trailing_input_errors() {
        let empty = env(&[]);
        assert!(matches!(eval("1 2", &empty), Err(EvalError::Syntax(_))));
    }

    #[test]
    fn test_truthiness() {
        assert!(Value::from_text("true").as_bool().unwrap());
        assert!(Value::from_text("1").as_bool().unwrap());
        assert!(!Value::from_text("false").as_bool().unwrap());
        assert!(!Value::from_text("0").as_bool().unwrap());
        assert!(Value::from_text("maybe").as_bool().is_err());
    }

    #[test]
    fn test_display_drops_integral_fraction() {
        assert_eq!(Value::Number(2.0).to_string(), "2");
        assert_eq!(Value::Number(2.5).to_string(), "2.5");
        assert_eq!(Value::Str("seg".into()).to_string(), "seg");
    }
}
