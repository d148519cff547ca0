//! Arithmetic calculator tool.
//!
//! Recursive-descent evaluator over `f64`:
//!
//! ```text
//! expr    := term (('+' | '-') term)*
//! term    := unary (('*' | '/' | '%') unary)*
//! unary   := '-' unary | '+' unary | power
//! power   := primary ('^' unary)?
//! primary := number | ident | ident '(' expr ')' | '(' expr ')'
//! ```

use async_trait::async_trait;

use crate::agent::tools::{Tool, ToolKind};
use crate::error::{LanternError, Result};

pub struct CalculatorTool {
    budget: usize,
}

impl CalculatorTool {
    pub fn new(budget: usize) -> Self {
        Self { budget }
    }
}

#[async_trait]
impl Tool for CalculatorTool {
    fn name(&self) -> &str {
        "calculator"
    }

    fn description(&self) -> &str {
        "Evaluate an arithmetic expression such as `(3 + 4) * 2 ^ 3` or `sqrt(2) / 3`. \
         Supports + - * / % ^, parentheses, sqrt, abs, ln, log, sin, cos, tan, pi and e. \
         Input must be only the expression."
    }

    fn budget(&self) -> usize {
        self.budget
    }

    fn kind(&self) -> ToolKind {
        ToolKind::Calculator
    }

    async fn invoke(&self, input: &str) -> Result<String> {
        let value = evaluate(input).map_err(LanternError::Tool)?;
        Ok(format_number(value))
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Op(char),
    LParen,
    RParen,
}

fn tokenize(input: &str) -> std::result::Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '0'..='9' | '.' => {
                let start = i;
                // Digit group separators: 1,000 and 1_000
                while i < chars.len()
                    && (chars[i].is_ascii_digit() || matches!(chars[i], '.' | ',' | '_'))
                {
                    i += 1;
                }
                let text: String = chars[start..i]
                    .iter()
                    .filter(|c| !matches!(c, ',' | '_'))
                    .collect();
                let n = text
                    .parse::<f64>()
                    .map_err(|_| format!("Invalid number '{}'", text))?;
                tokens.push(Token::Number(n));
            }
            c if c.is_ascii_alphabetic() => {
                let start = i;
                while i < chars.len() && chars[i].is_ascii_alphanumeric() {
                    i += 1;
                }
                let ident = chars[start..i].iter().collect::<String>().to_lowercase();
                if ident == "x" {
                    tokens.push(Token::Op('*'));
                } else {
                    tokens.push(Token::Ident(ident));
                }
            }
            '+' | '-' | '/' | '%' | '^' => {
                tokens.push(Token::Op(c));
                i += 1;
            }
            '*' | '×' => {
                // `**` is a common spelling of exponentiation
                if c == '*' && chars.get(i + 1) == Some(&'*') {
                    tokens.push(Token::Op('^'));
                    i += 2;
                } else {
                    tokens.push(Token::Op('*'));
                    i += 1;
                }
            }
            '÷' => {
                tokens.push(Token::Op('/'));
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            other => return Err(format!("Unexpected character '{}'", other)),
        }
    }
    Ok(tokens)
}

/// Nesting limit for parentheses, unary signs and exponent chains. The input
/// is model text, so it must fail as an error rather than exhaust the stack.
const MAX_DEPTH: usize = 256;

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            pos: 0,
            depth: 0,
        }
    }

    fn descend(&mut self) -> std::result::Result<(), String> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err("Expression nested too deeply".into());
        }
        Ok(())
    }

    fn ascend(&mut self) {
        self.depth -= 1;
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        t
    }

    fn expect_rparen(&mut self) -> std::result::Result<(), String> {
        match self.next() {
            Some(Token::RParen) => Ok(()),
            _ => Err("Missing closing parenthesis".into()),
        }
    }

    fn expr(&mut self) -> std::result::Result<f64, String> {
        let mut value = self.term()?;
        while let Some(Token::Op(op @ ('+' | '-'))) = self.peek().cloned() {
            self.pos += 1;
            let rhs = self.term()?;
            value = if op == '+' { value + rhs } else { value - rhs };
        }
        Ok(value)
    }

    fn term(&mut self) -> std::result::Result<f64, String> {
        let mut value = self.unary()?;
        while let Some(Token::Op(op @ ('*' | '/' | '%'))) = self.peek().cloned() {
            self.pos += 1;
            let rhs = self.unary()?;
            value = match op {
                '*' => value * rhs,
                _ if rhs == 0.0 => return Err("Division by zero".into()),
                '/' => value / rhs,
                _ => value % rhs,
            };
        }
        Ok(value)
    }

    fn unary(&mut self) -> std::result::Result<f64, String> {
        match self.peek() {
            Some(Token::Op(sign @ ('-' | '+'))) => {
                let negate = *sign == '-';
                self.pos += 1;
                self.descend()?;
                let value = self.unary()?;
                self.ascend();
                Ok(if negate { -value } else { value })
            }
            _ => self.power(),
        }
    }

    fn power(&mut self) -> std::result::Result<f64, String> {
        let base = self.primary()?;
        if let Some(Token::Op('^')) = self.peek() {
            self.pos += 1;
            self.descend()?;
            let exponent = self.unary()?;
            self.ascend();
            return Ok(base.powf(exponent));
        }
        Ok(base)
    }

    fn primary(&mut self) -> std::result::Result<f64, String> {
        match self.next() {
            Some(Token::Number(n)) => Ok(n),
            Some(Token::LParen) => {
                self.descend()?;
                let value = self.expr()?;
                self.expect_rparen()?;
                self.ascend();
                Ok(value)
            }
            Some(Token::Ident(name)) => {
                if let Some(Token::LParen) = self.peek() {
                    self.pos += 1;
                    self.descend()?;
                    let arg = self.expr()?;
                    self.expect_rparen()?;
                    self.ascend();
                    apply_function(&name, arg)
                } else {
                    constant(&name)
                }
            }
            Some(tok) => Err(format!("Unexpected token {:?}", tok)),
            None => Err("Unexpected end of expression".into()),
        }
    }
}

fn apply_function(name: &str, arg: f64) -> std::result::Result<f64, String> {
    match name {
        "sqrt" if arg < 0.0 => Err("Square root of a negative number".into()),
        "sqrt" => Ok(arg.sqrt()),
        "abs" => Ok(arg.abs()),
        "ln" if arg <= 0.0 => Err("Logarithm of a non-positive number".into()),
        "ln" => Ok(arg.ln()),
        "log" if arg <= 0.0 => Err("Logarithm of a non-positive number".into()),
        "log" => Ok(arg.log10()),
        "sin" => Ok(arg.sin()),
        "cos" => Ok(arg.cos()),
        "tan" => Ok(arg.tan()),
        "round" => Ok(arg.round()),
        "floor" => Ok(arg.floor()),
        "ceil" => Ok(arg.ceil()),
        other => Err(format!("Unknown function '{}'", other)),
    }
}

fn constant(name: &str) -> std::result::Result<f64, String> {
    match name {
        "pi" => Ok(std::f64::consts::PI),
        "e" => Ok(std::f64::consts::E),
        other => Err(format!("Unknown identifier '{}'", other)),
    }
}

/// Evaluate an arithmetic expression.
pub fn evaluate(input: &str) -> std::result::Result<f64, String> {
    let input = input.trim().trim_matches(|c| c == '`' || c == '"' || c == '\'');
    let input = input.trim_end_matches('=').trim();
    if input.is_empty() {
        return Err("Empty expression".into());
    }
    let tokens = tokenize(input)?;
    let mut parser = Parser::new(tokens);
    let value = parser.expr()?;
    if let Some(tok) = parser.peek() {
        return Err(format!("Unexpected token {:?}", tok));
    }
    if !value.is_finite() {
        return Err("Result is not a finite number".into());
    }
    Ok(value)
}

/// Print integral results without a fractional part.
fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        let s = format!("{:.10}", value);
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_arithmetic() {
        assert_eq!(evaluate("2+2").unwrap(), 4.0);
        assert_eq!(evaluate("2 + 3 * 4").unwrap(), 14.0);
        assert_eq!(evaluate("(2 + 3) * 4").unwrap(), 20.0);
        assert_eq!(evaluate("10 % 4").unwrap(), 2.0);
        assert_eq!(evaluate("7 / 2").unwrap(), 3.5);
    }

    #[test]
    fn test_power_is_right_associative_and_binds_tighter_than_minus() {
        assert_eq!(evaluate("2 ^ 3 ^ 2").unwrap(), 512.0);
        assert_eq!(evaluate("-2 ^ 2").unwrap(), -4.0);
        assert_eq!(evaluate("2 ** 10").unwrap(), 1024.0);
    }

    #[test]
    fn test_functions_and_constants() {
        assert_eq!(evaluate("sqrt(16)").unwrap(), 4.0);
        assert!((evaluate("2 * pi").unwrap() - std::f64::consts::TAU).abs() < 1e-12);
        assert_eq!(evaluate("abs(-3)").unwrap(), 3.0);
        assert!((evaluate("log(1000)").unwrap() - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_lenient_input() {
        assert_eq!(evaluate("`1,000 * 3`").unwrap(), 3000.0);
        assert_eq!(evaluate("6 x 7 =").unwrap(), 42.0);
    }

    #[test]
    fn test_errors() {
        assert!(evaluate("1 / 0").unwrap_err().contains("Division by zero"));
        assert!(evaluate("").is_err());
        assert!(evaluate("2 +").is_err());
        assert!(evaluate("(1 + 2").unwrap_err().contains("parenthesis"));
        assert!(evaluate("foo(2)").unwrap_err().contains("Unknown function"));
        assert!(evaluate("2 $ 3").is_err());
        assert!(evaluate("sqrt(-1)").is_err());
    }

    #[test]
    fn test_deep_nesting_is_an_error() {
        let parens = format!("{}1{}", "(".repeat(5000), ")".repeat(5000));
        assert_eq!(evaluate(&parens).unwrap_err(), "Expression nested too deeply");
        assert!(evaluate(&"(".repeat(5000)).is_err());
        assert!(evaluate(&format!("{}1", "-".repeat(5000))).is_err());
        assert!(evaluate(&format!("2{}", "^2".repeat(5000))).is_err());
        assert!(evaluate(&format!("{}1)", "sqrt(".repeat(5000))).is_err());
    }

    #[test]
    fn test_moderate_nesting_is_fine() {
        let parens = format!("{}7{}", "(".repeat(100), ")".repeat(100));
        assert_eq!(evaluate(&parens).unwrap(), 7.0);
        assert_eq!(evaluate("--3").unwrap(), 3.0);
        assert_eq!(evaluate("-(-(2 + 1))").unwrap(), 3.0);
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(4.0), "4");
        assert_eq!(format_number(3.5), "3.5");
        assert_eq!(format_number(1.0 / 3.0), "0.3333333333");
    }

    #[tokio::test]
    async fn test_invoke() {
        let tool = CalculatorTool::new(5);
        assert_eq!(tool.invoke("12 * 12").await.unwrap(), "144");
        let err = tool.invoke("1/0").await.unwrap_err();
        assert!(matches!(err, LanternError::Tool(_)));
        let nested = tool.invoke(&"(".repeat(5000)).await.unwrap_err();
        assert!(matches!(nested, LanternError::Tool(_)));
    }
}
