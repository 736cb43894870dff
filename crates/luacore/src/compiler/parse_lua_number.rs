use emmylua_parser::LuaSyntaxToken;

enum IntegerRepr {
    Normal,
    Hex,
}

pub enum NumberResult {
    Int(i64),
    Float(f64),
}

/// Parses an integer token's text following Lua 5.4's `l_str2int` rules:
/// decimal literals that overflow i64 become floats, hex literals wrap
/// modulo 2^64 digit-by-digit and never overflow.
pub fn int_token_value(token: &LuaSyntaxToken) -> Result<NumberResult, String> {
    let text = token.text();
    let repr = if text.starts_with("0x") || text.starts_with("0X") {
        IntegerRepr::Hex
    } else {
        IntegerRepr::Normal
    };

    match repr {
        IntegerRepr::Hex => {
            let digits = &text[2..];
            if digits.is_empty() || !digits.bytes().all(|b| (b as char).is_ascii_hexdigit()) {
                return Err(format!("malformed number near '{}'", text));
            }
            let mut value: u64 = 0;
            for c in digits.chars() {
                let digit = c.to_digit(16).unwrap() as u64;
                value = value.wrapping_mul(16).wrapping_add(digit);
            }
            Ok(NumberResult::Int(value as i64))
        }
        IntegerRepr::Normal => match text.parse::<i64>() {
            Ok(value) => Ok(NumberResult::Int(value)),
            Err(e) => {
                if matches!(
                    *e.kind(),
                    std::num::IntErrorKind::NegOverflow | std::num::IntErrorKind::PosOverflow
                ) {
                    match text.parse::<f64>() {
                        Ok(f) => Ok(NumberResult::Float(f)),
                        Err(_) => Err(format!("malformed number near '{}'", text)),
                    }
                } else {
                    Err(format!(
                        "malformed number near '{}': {}",
                        token.text(),
                        e
                    ))
                }
            }
        },
    }
}
