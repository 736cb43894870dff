use crate::LuaValue;

pub fn parse_lua_number(s: &str) -> LuaValue {
    let s = s.trim();
    if s.is_empty() {
        return LuaValue::nil();
    }

    // Handle sign
    let (sign, rest) = if s.starts_with('-') {
        (-1i64, &s[1..])
    } else if s.starts_with('+') {
        (1i64, &s[1..])
    } else {
        (1i64, s)
    };

    let rest = rest.trim_start();

    // Check for hex prefix (0x or 0X)
    if rest.starts_with("0x") || rest.starts_with("0X") {
        let hex_part = &rest[2..];

        // Hex float contains '.' or 'p'/'P' - always treat as float
        if hex_part.contains('.') || hex_part.to_lowercase().contains('p') {
            return match parse_hex_float(hex_part) {
                Some(f) => LuaValue::float(sign as f64 * f),
                None => LuaValue::nil(),
            };
        }

        // Plain hex integer
        if let Ok(i) = u64::from_str_radix(hex_part, 16) {
            let i = i as i64;
            return LuaValue::integer(sign * i);
        }
        return LuaValue::nil();
    }

    // Decimal number - determine if integer or float
    let has_dot = rest.contains('.');
    let has_exponent = rest.to_lowercase().contains('e');

    if !has_dot && !has_exponent {
        // Try as integer
        if let Ok(i) = s.parse::<i64>() {
            return LuaValue::integer(i);
        }
    }

    // Try as float (either has '.'/e' or integer parse failed due to overflow)
    if let Ok(f) = s.parse::<f64>() {
        return LuaValue::float(f);
    }

    LuaValue::nil()
}

/// Parses the digits after `0x`/`0X` of a hex float: `hexdigits['.'hexdigits]['p'|'P' ['+'|'-'] decdigits]`
/// (对齐lobject.c的l_str2d对十六进制浮点数的处理)
fn parse_hex_float(hex_part: &str) -> Option<f64> {
    let bytes = hex_part.as_bytes();
    let mut i = 0;
    let mut mantissa: f64 = 0.0;
    let mut any_digits = false;

    while i < bytes.len() && bytes[i].is_ascii_hexdigit() {
        mantissa = mantissa * 16.0 + (bytes[i] as char).to_digit(16).unwrap() as f64;
        any_digits = true;
        i += 1;
    }

    if i < bytes.len() && bytes[i] == b'.' {
        i += 1;
        let mut frac_scale = 1.0 / 16.0;
        while i < bytes.len() && bytes[i].is_ascii_hexdigit() {
            mantissa += (bytes[i] as char).to_digit(16).unwrap() as f64 * frac_scale;
            frac_scale /= 16.0;
            any_digits = true;
            i += 1;
        }
    }

    if !any_digits {
        return None;
    }

    let mut exponent: i32 = 0;
    if i < bytes.len() && (bytes[i] == b'p' || bytes[i] == b'P') {
        i += 1;
        let exp_sign = if i < bytes.len() && (bytes[i] == b'+' || bytes[i] == b'-') {
            let sign = if bytes[i] == b'-' { -1 } else { 1 };
            i += 1;
            sign
        } else {
            1
        };
        let exp_start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        if i == exp_start {
            return None; // 'p' requires at least one exponent digit
        }
        let exp_digits = std::str::from_utf8(&bytes[exp_start..i]).ok()?;
        exponent = exp_sign * exp_digits.parse::<i32>().ok()?;
    }

    if i != bytes.len() {
        return None; // trailing garbage
    }

    Some(mantissa * 2f64.powi(exponent))
}
