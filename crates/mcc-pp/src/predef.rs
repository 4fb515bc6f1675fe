//! Predefined macros (C11 6.10.8) and the `_Pragma` operator.

use crate::macros::{Macro, Predefined};
use crate::Preprocessor;
use mcc_lex::{Encoding, Lexer, Punct, Token, TokenKind};
use mcc_util::{Fatal, Result, Symbol};
use std::time::{SystemTime, UNIX_EPOCH};

const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];
const WEEKDAYS: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];

/// Civil date/time in UTC split out of a unix timestamp.
struct Civil {
    year: i64,
    month: usize,
    day: i64,
    weekday: usize,
    hour: i64,
    min: i64,
    sec: i64,
}

fn civil_now() -> Civil {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);
    let days = secs.div_euclid(86_400);
    let rem = secs.rem_euclid(86_400);

    // days-from-civil inverted (Gregorian calendar, era arithmetic)
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let y = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = doy - (153 * mp + 2) / 5 + 1;
    let m = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = if m <= 2 { y + 1 } else { y };

    Civil {
        year,
        month: (m - 1) as usize,
        day: d,
        // the epoch was a Thursday
        weekday: (days + 4).rem_euclid(7) as usize,
        hour: rem / 3600,
        min: rem % 3600 / 60,
        sec: rem % 60,
    }
}

impl Preprocessor {
    pub(crate) fn init_predefined_macros(&mut self) {
        let defs: &[(&str, Predefined)] = &[
            ("__DATE__", Predefined::Date),
            ("__TIME__", Predefined::Time),
            ("__TIMESTAMP__", Predefined::Timestamp),
            ("__FILE__", Predefined::File),
            ("__LINE__", Predefined::Line),
            ("__BASE_FILE__", Predefined::BaseFile),
            ("__COUNTER__", Predefined::Counter),
            ("__INCLUDE_LEVEL__", Predefined::IncludeLevel),
            ("_Pragma", Predefined::Pragma),
        ];
        for &(name, kind) in defs {
            self.macros
                .insert(Symbol::intern(name), Macro::Predefined(kind));
        }
    }

    fn subst_string(&self, text: &str, tok: &Token) -> Token {
        let mut t = Token::new(
            TokenKind::Str {
                value: text.as_bytes().to_vec().into(),
                enc: Encoding::None,
            },
            tok.pos,
        );
        tok.copy_attrs_to(&mut t);
        t
    }

    fn subst_number(&self, value: i64, tok: &Token) -> Token {
        let mut t = Token::new(
            TokenKind::Number(Symbol::intern(&value.to_string())),
            tok.pos,
        );
        tok.copy_attrs_to(&mut t);
        t
    }

    /// Expand one predefined macro. Returns `None` to continue scanning
    /// (used by `_Pragma`, which produces no tokens).
    pub(crate) fn expand_predefined(
        &mut self,
        kind: Predefined,
        tok: &Token,
    ) -> Result<Option<Token>> {
        let now = civil_now;
        Ok(match kind {
            Predefined::File => Some(self.subst_string(tok.pos.file.as_str(), tok)),
            Predefined::Line => Some(self.subst_number(tok.pos.row as i64, tok)),
            Predefined::Date => {
                let c = now();
                Some(self.subst_string(
                    &format!("{} {:2} {}", MONTHS[c.month], c.day, c.year),
                    tok,
                ))
            }
            Predefined::Time => {
                let c = now();
                Some(self.subst_string(
                    &format!("{:02}:{:02}:{:02}", c.hour, c.min, c.sec),
                    tok,
                ))
            }
            Predefined::Timestamp => {
                let c = now();
                Some(self.subst_string(
                    &format!(
                        "{} {} {:2} {:02}:{:02}:{:02} {}",
                        WEEKDAYS[c.weekday],
                        MONTHS[c.month],
                        c.day,
                        c.hour,
                        c.min,
                        c.sec,
                        c.year
                    ),
                    tok,
                ))
            }
            Predefined::BaseFile => {
                let base = self.lexer.base_file();
                Some(self.subst_string(base.as_str(), tok))
            }
            Predefined::Counter => Some(self.subst_number(self.ctx.next_counter() as i64, tok)),
            Predefined::IncludeLevel => {
                let level = self.lexer.fileset().count().saturating_sub(1);
                Some(self.subst_number(level as i64, tok))
            }
            Predefined::Pragma => {
                let t = self.lexer.get_token();
                if !t.is_punct(Punct::LParen) {
                    self.ctx.diag.error(t.pos, "expected '('");
                    return Err(Fatal::Preprocess("bad _Pragma".into()));
                }
                let operand = self.lexer.get_token();
                if let TokenKind::Str { value, .. } = &operand.kind {
                    let text = String::from_utf8_lossy(value).into_owned();
                    let mut toks = Lexer::tokens_from_string(self.ctx.clone(), &text);
                    for t in &mut toks {
                        t.pos = operand.pos;
                    }
                    if !toks.is_empty() {
                        self.read_pragma_operands(&toks)?;
                    }
                } else {
                    self.ctx.diag.error(operand.pos, "expected string literal");
                    return Err(Fatal::Preprocess("bad _Pragma".into()));
                }
                let close = self.lexer.get_token();
                if !close.is_punct(Punct::RParen) {
                    self.ctx.diag.error(close.pos, "expected ')'");
                    return Err(Fatal::Preprocess("bad _Pragma".into()));
                }
                None
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_civil_now_is_plausible() {
        let c = civil_now();
        assert!(c.year >= 2024);
        assert!(c.month < 12);
        assert!((1..=31).contains(&c.day));
        assert!(c.hour < 24 && c.min < 60 && c.sec < 60);
        assert!(c.weekday < 7);
    }
}
