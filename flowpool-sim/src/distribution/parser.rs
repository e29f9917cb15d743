//! Tokenizer for `NAME(arg, ...)` formulas.

use flowpool_core::Value;

/// A formula split into its upper-cased name and literal arguments.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ParsedFormula {
    pub name: String,
    pub args: Vec<Value>,
}

/// Splits `text` into a name and arguments.
///
/// A bare number is read as `CONS(number)`. Arguments may be numbers, quoted
/// strings (single or double quotes) or bare words.
pub(crate) fn parse_formula(text: &str) -> Result<ParsedFormula, String> {
    let text = text.trim();
    if text.is_empty() {
        return Err("empty formula".to_string());
    }
    if let Ok(number) = text.parse::<f64>() {
        return Ok(ParsedFormula {
            name: "CONS".to_string(),
            args: vec![Value::Float(number)],
        });
    }

    let open = text
        .find('(')
        .ok_or_else(|| "expected `NAME(args...)`".to_string())?;
    if !text.ends_with(')') {
        return Err("missing closing parenthesis".to_string());
    }
    let name = text[..open].trim();
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(format!("invalid distribution name `{name}`"));
    }
    let body = &text[open + 1..text.len() - 1];
    let args = split_args(body)?
        .into_iter()
        .map(|raw| literal(&raw))
        .collect::<Result<Vec<_>, _>>()?;
    if args.is_empty() {
        return Err("no arguments".to_string());
    }

    Ok(ParsedFormula {
        name: name.to_ascii_uppercase(),
        args,
    })
}

/// Splits on commas outside quotes. Quotes are kept on the pieces.
fn split_args(body: &str) -> Result<Vec<String>, String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;

    for c in body.chars() {
        match (quote, c) {
            (Some(q), c) if c == q => {
                quote = None;
                current.push(c);
            }
            (Some(_), c) => current.push(c),
            (None, '"' | '\'') => {
                quote = Some(c);
                current.push(c);
            }
            (None, ',') => args.push(std::mem::take(&mut current)),
            (None, '(' | ')') => return Err("nested parentheses are not supported".to_string()),
            (None, c) => current.push(c),
        }
    }
    if quote.is_some() {
        return Err("unterminated string literal".to_string());
    }
    if !current.trim().is_empty() || !args.is_empty() {
        args.push(current);
    }
    Ok(args)
}

fn literal(raw: &str) -> Result<Value, String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err("empty argument".to_string());
    }
    let quoted = raw.len() >= 2
        && ((raw.starts_with('"') && raw.ends_with('"'))
            || (raw.starts_with('\'') && raw.ends_with('\'')));
    if quoted {
        return Ok(Value::Str(raw[1..raw.len() - 1].to_string()));
    }
    if let Ok(v) = raw.parse::<i64>() {
        return Ok(Value::Int(v));
    }
    if let Ok(v) = raw.parse::<f64>() {
        return Ok(Value::Float(v));
    }
    Ok(Value::Str(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_names_case_insensitively() {
        let parsed = parse_formula(" unif( 2 , 5.5 ) ").expect("valid formula");
        assert_eq!(parsed.name, "UNIF");
        assert_eq!(parsed.args, vec![Value::Int(2), Value::Float(5.5)]);
    }

    #[test]
    fn bare_number_is_constant() {
        let parsed = parse_formula("12.5").expect("valid number");
        assert_eq!(parsed.name, "CONS");
        assert_eq!(parsed.args, vec![Value::Float(12.5)]);
    }

    #[test]
    fn quoted_and_bare_strings() {
        let parsed = parse_formula(r#"DISC(0.5,"a, b",0.5,'c',0, d)"#).expect("valid formula");
        assert_eq!(
            parsed.args,
            vec![
                Value::Float(0.5),
                Value::from("a, b"),
                Value::Float(0.5),
                Value::from("c"),
                Value::Int(0),
                Value::from("d"),
            ]
        );
    }

    #[test]
    fn rejects_malformed_text() {
        assert!(parse_formula("").is_err());
        assert!(parse_formula("UNIF 2,5").is_err());
        assert!(parse_formula("UNIF(2,5").is_err());
        assert!(parse_formula("UN1F(2,5)").is_err());
        assert!(parse_formula("CONS()").is_err());
        assert!(parse_formula("UNIF(2,,5)").is_err());
        assert!(parse_formula(r#"DISC(1,"a)"#).is_err());
    }
}
