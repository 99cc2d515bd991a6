//! Printing values back in script syntax

use crate::ast::Datum;
use std::fmt;

impl fmt::Display for Datum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Datum::Int(n) => write!(f, "{}", n),
            Datum::Float(x) if x.fract() == 0.0 && x.is_finite() => write!(f, "{:.1}", x),
            Datum::Float(x) => write!(f, "{}", x),
            Datum::Str(s) => write!(f, "\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\"")),
            Datum::Bool(b) => f.write_str(if *b { "#t" } else { "#f" }),
            Datum::Color(c) => write!(f, "#({} {} {} {})", c.r, c.g, c.b, c.a),
            Datum::List(items) => {
                f.write_str("(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str(")")
            }
        }
    }
}
