//! Evaluator for the object-literal assignments embedded in product pages.
//!
//! Only literal values and a handful of pure operators are understood. There
//! are no host bindings: calls, `new`, functions and regex literals are
//! rejected, and unknown identifiers read as `undefined`.

use std::collections::HashMap;

use thiserror::Error;

const MAX_DEPTH: usize = 128;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScriptError {
    #[error("unexpected character {0:?} at offset {1}")]
    UnexpectedChar(char, usize),
    #[error("unterminated string at offset {0}")]
    UnterminatedString(usize),
    #[error("unterminated comment at offset {0}")]
    UnterminatedComment(usize),
    #[error("bad number literal {0:?}")]
    BadNumber(String),
    #[error("expected {expected}, found {found}")]
    Expected { expected: String, found: String },
    #[error("{0} is not supported")]
    Unsupported(String),
    #[error("nesting deeper than {MAX_DEPTH}")]
    TooDeep,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    Str(String),
    Array(Vec<Value>),
    Object(HashMap<String, Value>),
}

impl Value {
    fn truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::Str(s) => !s.is_empty(),
            Value::Array(_) | Value::Object(_) => true,
        }
    }

    fn member(&self, key: &str) -> Value {
        match self {
            Value::Object(map) => map.get(key).cloned().unwrap_or(Value::Undefined),
            Value::Array(items) if key == "length" => Value::Number(items.len() as f64),
            Value::Array(items) => key
                .parse::<usize>()
                .ok()
                .and_then(|i| items.get(i).cloned())
                .unwrap_or(Value::Undefined),
            Value::Str(s) if key == "length" => Value::Number(s.chars().count() as f64),
            _ => Value::Undefined,
        }
    }

    /// Integer view: numbers truncate, numeric strings parse, everything else is 0.
    pub fn to_integer(&self) -> i64 {
        let n = match self {
            Value::Number(n) => *n,
            Value::Bool(b) => f64::from(u8::from(*b)),
            Value::Str(s) => s.trim().parse::<f64>().unwrap_or(0.0),
            _ => 0.0,
        };
        if n.is_finite() {
            n.trunc() as i64
        } else {
            0
        }
    }

    /// Text view: strings as-is, scalars formatted, missing or compound values empty.
    pub fn to_text(&self) -> String {
        match self {
            Value::Str(s) => s.clone(),
            Value::Number(n) => format_number(*n),
            Value::Bool(b) => b.to_string(),
            _ => String::new(),
        }
    }

    /// Integer-list view: only an array made entirely of integral numbers.
    pub fn to_integer_list(&self) -> Vec<i64> {
        let Value::Array(items) = self else {
            return Vec::new();
        };
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            match item {
                Value::Number(n) if n.is_finite() && n.fract() == 0.0 => out.push(*n as i64),
                _ => return Vec::new(),
            }
        }
        out
    }

    fn to_concat_text(&self) -> String {
        match self {
            Value::Undefined => "undefined".into(),
            Value::Null => "null".into(),
            other => other.to_text(),
        }
    }
}

fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e21 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

/// Global scope produced by running a script.
#[derive(Debug, Default)]
pub struct Scope {
    globals: HashMap<String, Value>,
}

impl Scope {
    /// Reads a dotted path such as `pageConfig.product.skuid`.
    pub fn lookup(&self, path: &str) -> Value {
        let mut parts = path.split('.');
        let Some(first) = parts.next() else {
            return Value::Undefined;
        };
        let mut current = self.globals.get(first).cloned().unwrap_or(Value::Undefined);
        for part in parts {
            current = current.member(part);
        }
        current
    }

    fn assign(&mut self, path: &[String], value: Value) {
        // `window.x = ...` and `x = ...` land in the same global.
        let path = match path.split_first() {
            Some((head, rest)) if head == "window" && !rest.is_empty() => rest,
            _ => path,
        };
        let Some((head, rest)) = path.split_first() else {
            return;
        };
        if rest.is_empty() {
            self.globals.insert(head.clone(), value);
            return;
        }
        let slot = self
            .globals
            .entry(head.clone())
            .or_insert_with(|| Value::Object(HashMap::new()));
        assign_into(slot, rest, value);
    }
}

fn assign_into(slot: &mut Value, path: &[String], value: Value) {
    if !matches!(slot, Value::Object(_)) {
        *slot = Value::Object(HashMap::new());
    }
    let Value::Object(map) = slot else {
        return;
    };
    match path.split_first() {
        Some((key, [])) => {
            map.insert(key.clone(), value);
        }
        Some((key, rest)) => {
            let child = map
                .entry(key.clone())
                .or_insert_with(|| Value::Object(HashMap::new()));
            assign_into(child, rest, value);
        }
        None => {}
    }
}

/// Runs a script and returns the resulting global scope.
pub fn run(source: &str) -> Result<Scope, ScriptError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
        scope: Scope::default(),
    };
    parser.program()?;
    Ok(parser.scope)
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Num(f64),
    Punct(&'static str),
    Eof,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Ident(s) => format!("identifier `{s}`"),
            Token::Str(_) => "string".into(),
            Token::Num(n) => format!("number {n}"),
            Token::Punct(p) => format!("`{p}`"),
            Token::Eof => "end of input".into(),
        }
    }
}

const PUNCTS: [&str; 22] = [
    "===", "!==", "==", "!=", "||", "&&", "{", "}", "[", "]", "(", ")", ",", ":", ";", ".", "=",
    "+", "-", "!", "?", "/",
];

fn tokenize(src: &str) -> Result<Vec<Token>, ScriptError> {
    let chars: Vec<char> = src.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        if c == '/' && chars.get(i + 1) == Some(&'/') {
            while i < chars.len() && chars[i] != '\n' {
                i += 1;
            }
            continue;
        }
        if c == '/' && chars.get(i + 1) == Some(&'*') {
            let start = i;
            i += 2;
            loop {
                match (chars.get(i), chars.get(i + 1)) {
                    (Some('*'), Some('/')) => break,
                    (None, _) => return Err(ScriptError::UnterminatedComment(start)),
                    _ => i += 1,
                }
            }
            i += 2;
            continue;
        }
        if c == '"' || c == '\'' {
            let (text, next) = read_string(&chars, i)?;
            tokens.push(Token::Str(text));
            i = next;
            continue;
        }
        if c.is_ascii_digit() || (c == '.' && chars.get(i + 1).is_some_and(char::is_ascii_digit)) {
            let (n, next) = read_number(&chars, i)?;
            tokens.push(Token::Num(n));
            i = next;
            continue;
        }
        if c.is_alphabetic() || c == '_' || c == '$' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '$')
            {
                i += 1;
            }
            tokens.push(Token::Ident(chars[start..i].iter().collect()));
            continue;
        }
        let punct = PUNCTS.iter().find(|p| {
            p.chars()
                .enumerate()
                .all(|(k, pc)| chars.get(i + k) == Some(&pc))
        });
        match punct {
            Some(p) => {
                tokens.push(Token::Punct(*p));
                i += p.len();
            }
            None => return Err(ScriptError::UnexpectedChar(c, i)),
        }
    }
    tokens.push(Token::Eof);
    Ok(tokens)
}

fn read_string(chars: &[char], start: usize) -> Result<(String, usize), ScriptError> {
    let quote = chars[start];
    let mut out = String::new();
    let mut i = start + 1;
    loop {
        let Some(&c) = chars.get(i) else {
            return Err(ScriptError::UnterminatedString(start));
        };
        i += 1;
        match c {
            c if c == quote => return Ok((out, i)),
            '\n' => return Err(ScriptError::UnterminatedString(start)),
            '\\' => {
                let Some(&esc) = chars.get(i) else {
                    return Err(ScriptError::UnterminatedString(start));
                };
                i += 1;
                match esc {
                    'n' => out.push('\n'),
                    't' => out.push('\t'),
                    'r' => out.push('\r'),
                    'b' => out.push('\u{8}'),
                    'f' => out.push('\u{c}'),
                    'v' => out.push('\u{b}'),
                    '0' => out.push('\0'),
                    '\n' => {}
                    'u' | 'x' => {
                        let width = if esc == 'u' { 4 } else { 2 };
                        let hex: String = chars.iter().skip(i).take(width).collect();
                        let decoded = u32::from_str_radix(&hex, 16)
                            .ok()
                            .filter(|_| hex.len() == width)
                            .and_then(char::from_u32);
                        match decoded {
                            Some(ch) => {
                                out.push(ch);
                                i += width;
                            }
                            None => out.push(esc),
                        }
                    }
                    other => out.push(other),
                }
            }
            c => out.push(c),
        }
    }
}

fn read_number(chars: &[char], start: usize) -> Result<(f64, usize), ScriptError> {
    let mut i = start;
    if chars[i] == '0' && matches!(chars.get(i + 1), Some('x' | 'X')) {
        i += 2;
        while i < chars.len() && chars[i].is_ascii_hexdigit() {
            i += 1;
        }
        let text: String = chars[start + 2..i].iter().collect();
        return i64::from_str_radix(&text, 16)
            .map(|n| (n as f64, i))
            .map_err(|_| ScriptError::BadNumber(text));
    }
    while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
        i += 1;
    }
    if matches!(chars.get(i), Some('e' | 'E')) {
        i += 1;
        if matches!(chars.get(i), Some('+' | '-')) {
            i += 1;
        }
        while i < chars.len() && chars[i].is_ascii_digit() {
            i += 1;
        }
    }
    let text: String = chars[start..i].iter().collect();
    text.parse::<f64>()
        .map(|n| (n, i))
        .map_err(|_| ScriptError::BadNumber(text))
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
    scope: Scope,
}

impl Parser {
    fn peek(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or(&Token::Eof)
    }

    fn peek_at(&self, offset: usize) -> &Token {
        self.tokens.get(self.pos + offset).unwrap_or(&Token::Eof)
    }

    fn next(&mut self) -> Token {
        let token = self.peek().clone();
        if token != Token::Eof {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, punct: &str) -> bool {
        if matches!(self.peek(), Token::Punct(p) if *p == punct) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, punct: &str) -> Result<(), ScriptError> {
        if self.eat(punct) {
            Ok(())
        } else {
            Err(ScriptError::Expected {
                expected: format!("`{punct}`"),
                found: self.peek().describe(),
            })
        }
    }

    fn ident(&mut self) -> Result<String, ScriptError> {
        match self.next() {
            Token::Ident(name) => Ok(name),
            other => Err(ScriptError::Expected {
                expected: "identifier".into(),
                found: other.describe(),
            }),
        }
    }

    fn program(&mut self) -> Result<(), ScriptError> {
        loop {
            while self.eat(";") {}
            if *self.peek() == Token::Eof {
                return Ok(());
            }
            self.statement()?;
            if !self.eat(";") && *self.peek() != Token::Eof {
                return Err(ScriptError::Expected {
                    expected: "`;`".into(),
                    found: self.peek().describe(),
                });
            }
        }
    }

    fn statement(&mut self) -> Result<(), ScriptError> {
        if matches!(self.peek(), Token::Ident(k) if k == "var" || k == "let" || k == "const") {
            self.pos += 1;
            loop {
                let name = self.ident()?;
                let value = if self.eat("=") {
                    self.expression()?
                } else {
                    Value::Undefined
                };
                self.scope.assign(&[name], value);
                if !self.eat(",") {
                    return Ok(());
                }
            }
        }

        if let Some(path) = self.assignment_target() {
            let value = self.expression()?;
            self.scope.assign(&path, value);
            return Ok(());
        }

        self.expression().map(|_| ())
    }

    /// Consumes `a.b.c =` when present.
    fn assignment_target(&mut self) -> Option<Vec<String>> {
        let mut path = Vec::new();
        let mut offset = 0;
        loop {
            match self.peek_at(offset) {
                Token::Ident(name) => path.push(name.clone()),
                _ => return None,
            }
            offset += 1;
            match self.peek_at(offset) {
                Token::Punct(".") => offset += 1,
                Token::Punct("=") => {
                    self.pos += offset + 1;
                    return Some(path);
                }
                _ => return None,
            }
        }
    }

    fn enter(&mut self) -> Result<(), ScriptError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            Err(ScriptError::TooDeep)
        } else {
            Ok(())
        }
    }

    fn expression(&mut self) -> Result<Value, ScriptError> {
        self.enter()?;
        let result = self.conditional();
        self.depth -= 1;
        result
    }

    fn conditional(&mut self) -> Result<Value, ScriptError> {
        let test = self.logical_or()?;
        if !self.eat("?") {
            return Ok(test);
        }
        let yes = self.expression()?;
        self.expect(":")?;
        let no = self.expression()?;
        Ok(if test.truthy() { yes } else { no })
    }

    fn logical_or(&mut self) -> Result<Value, ScriptError> {
        let mut left = self.logical_and()?;
        while self.eat("||") {
            let right = self.logical_and()?;
            if !left.truthy() {
                left = right;
            }
        }
        Ok(left)
    }

    fn logical_and(&mut self) -> Result<Value, ScriptError> {
        let mut left = self.equality()?;
        while self.eat("&&") {
            let right = self.equality()?;
            if left.truthy() {
                left = right;
            }
        }
        Ok(left)
    }

    fn equality(&mut self) -> Result<Value, ScriptError> {
        let mut left = self.additive()?;
        loop {
            let negate = if self.eat("===") || self.eat("==") {
                false
            } else if self.eat("!==") || self.eat("!=") {
                true
            } else {
                return Ok(left);
            };
            let right = self.additive()?;
            left = Value::Bool((left == right) != negate);
        }
    }

    fn additive(&mut self) -> Result<Value, ScriptError> {
        let mut left = self.unary()?;
        loop {
            if self.eat("+") {
                let right = self.unary()?;
                left = match (&left, &right) {
                    (Value::Number(a), Value::Number(b)) => Value::Number(a + b),
                    (Value::Str(_), _) | (_, Value::Str(_)) => {
                        Value::Str(left.to_concat_text() + &right.to_concat_text())
                    }
                    _ => Value::Number(f64::NAN),
                };
            } else if self.eat("-") {
                let right = self.unary()?;
                left = match (&left, &right) {
                    (Value::Number(a), Value::Number(b)) => Value::Number(a - b),
                    _ => Value::Number(f64::NAN),
                };
            } else {
                return Ok(left);
            }
        }
    }

    fn unary(&mut self) -> Result<Value, ScriptError> {
        if self.eat("!") {
            self.enter()?;
            let v = self.unary();
            self.depth -= 1;
            return Ok(Value::Bool(!v?.truthy()));
        }
        if self.eat("-") {
            self.enter()?;
            let v = self.unary();
            self.depth -= 1;
            return Ok(match v? {
                Value::Number(n) => Value::Number(-n),
                Value::Str(s) => Value::Number(-s.trim().parse::<f64>().unwrap_or(f64::NAN)),
                _ => Value::Number(f64::NAN),
            });
        }
        if self.eat("+") {
            self.enter()?;
            let v = self.unary();
            self.depth -= 1;
            return Ok(match v? {
                Value::Number(n) => Value::Number(n),
                Value::Str(s) => Value::Number(s.trim().parse::<f64>().unwrap_or(f64::NAN)),
                Value::Bool(b) => Value::Number(f64::from(u8::from(b))),
                _ => Value::Number(f64::NAN),
            });
        }
        self.postfix()
    }

    fn postfix(&mut self) -> Result<Value, ScriptError> {
        let mut value = self.primary()?;
        loop {
            if self.eat(".") {
                let key = self.ident()?;
                value = value.member(&key);
            } else if self.eat("[") {
                let key = self.expression()?;
                self.expect("]")?;
                value = value.member(&key.to_text());
            } else if matches!(self.peek(), Token::Punct("(")) {
                return Err(ScriptError::Unsupported("function call".into()));
            } else {
                return Ok(value);
            }
        }
    }

    fn primary(&mut self) -> Result<Value, ScriptError> {
        match self.next() {
            Token::Num(n) => Ok(Value::Number(n)),
            Token::Str(s) => Ok(Value::Str(s)),
            Token::Punct("(") => {
                let v = self.expression()?;
                self.expect(")")?;
                Ok(v)
            }
            Token::Punct("{") => self.object(),
            Token::Punct("[") => self.array(),
            Token::Ident(name) => match name.as_str() {
                "true" => Ok(Value::Bool(true)),
                "false" => Ok(Value::Bool(false)),
                "null" => Ok(Value::Null),
                "undefined" => Ok(Value::Undefined),
                "NaN" => Ok(Value::Number(f64::NAN)),
                "Infinity" => Ok(Value::Number(f64::INFINITY)),
                "function" | "new" | "class" | "this" | "typeof" | "delete" | "void" => {
                    Err(ScriptError::Unsupported(format!("`{name}`")))
                }
                _ => Ok(self.scope.lookup(&name)),
            },
            Token::Punct("/") => Err(ScriptError::Unsupported("regular expression".into())),
            other => Err(ScriptError::Expected {
                expected: "value".into(),
                found: other.describe(),
            }),
        }
    }

    fn object(&mut self) -> Result<Value, ScriptError> {
        self.enter()?;
        let mut map = HashMap::new();
        loop {
            if self.eat("}") {
                break;
            }
            let key = match self.next() {
                Token::Ident(k) | Token::Str(k) => k,
                Token::Num(n) => format_number(n),
                other => {
                    return Err(ScriptError::Expected {
                        expected: "property key".into(),
                        found: other.describe(),
                    })
                }
            };
            self.expect(":")?;
            let value = self.expression()?;
            map.insert(key, value);
            if !self.eat(",") {
                self.expect("}")?;
                break;
            }
        }
        self.depth -= 1;
        Ok(Value::Object(map))
    }

    fn array(&mut self) -> Result<Value, ScriptError> {
        self.enter()?;
        let mut items = Vec::new();
        loop {
            if self.eat("]") {
                break;
            }
            items.push(self.expression()?);
            if !self.eat(",") {
                self.expect("]")?;
                break;
            }
        }
        self.depth -= 1;
        Ok(Value::Array(items))
    }
}
