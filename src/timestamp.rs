//! Parsing of the `Timestamp` column.
//!
//! Measurement exports do not agree on a date format, so timestamps are
//! lexed into numbers and separators first and the layout is decided from
//! the shape of the date part:
//!
//! - `2024-05-02 13:15:00`, `2024/05/02T13:15` (year first)
//! - `02.05.2024 13:15` (day first, dotted)
//! - `05/02/2024 13:15` (month first)
//!
//! A missing time part means midnight. Time-zone suffixes are rejected.

use std::num::ParseIntError;

use logos::Logos;
use miette::Diagnostic;
use thiserror::Error;
use time::{macros::datetime, Date, Duration, Month, PrimitiveDateTime, Time};

#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
#[logos(skip r"[ \t]+")] // Date and time are separated by blanks or a `T`
enum Token {
    #[regex("[0-9]+")]
    Number,

    #[token("-")]
    Dash,
    #[token("/")]
    Slash,
    #[token(".")]
    Dot,
    #[token(":")]
    Colon,
    #[token("T")]
    T,
}

#[derive(Debug, Error, Diagnostic, PartialEq)]
pub enum TimestampError {
    #[error("Empty timestamp")]
    #[diagnostic(code(power_avg::timestamp::empty))]
    Empty,
    #[error("Unexpected `{0}` in timestamp")]
    #[diagnostic(
        code(power_avg::timestamp::unexpected),
        help("expected something like `2024-05-02 13:15:00` or `02.05.2024 13:15`")
    )]
    Unexpected(String),
    #[error("Timestamp ends too early")]
    #[diagnostic(code(power_avg::timestamp::incomplete))]
    Incomplete,
    #[error("Bad number in timestamp: {0}")]
    #[diagnostic(code(power_avg::timestamp::number))]
    Number(#[from] ParseIntError),
    #[error("Invalid timestamp component: {0}")]
    #[diagnostic(code(power_avg::timestamp::component))]
    InvalidComponent(#[from] time::error::ComponentRange),
    #[error("Spreadsheet date serial {0} is out of range")]
    #[diagnostic(code(power_avg::timestamp::serial))]
    Serial(f64),
}

/// Parse a textual timestamp into a naive date-time.
pub fn parse_timestamp(s: &str) -> Result<PrimitiveDateTime, TimestampError> {
    let s = s.trim();
    if s.is_empty() {
        return Err(TimestampError::Empty);
    }

    let mut lexer = Token::lexer(s);
    let mut tokens = Vec::new();
    while let Some(token) = lexer.next() {
        match token {
            Ok(token) => tokens.push((token, lexer.slice())),
            Err(()) => return Err(TimestampError::Unexpected(lexer.slice().to_string())),
        }
    }

    let mut cursor = Cursor {
        tokens: &tokens,
        pos: 0,
    };
    let date = cursor.date()?;
    let time = cursor.time()?;
    if let Some((_, slice)) = cursor.next() {
        return Err(TimestampError::Unexpected(slice.to_string()));
    }

    Ok(PrimitiveDateTime::new(date, time))
}

const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// Convert a spreadsheet date serial (days since 1899-12-30, fractional part
/// being the time of day) into a date-time, rounded to the millisecond.
pub fn from_excel_serial(serial: f64) -> Result<PrimitiveDateTime, TimestampError> {
    if !serial.is_finite() {
        return Err(TimestampError::Serial(serial));
    }
    let millis = (serial * MILLIS_PER_DAY).round();
    if millis.abs() > i64::MAX as f64 {
        return Err(TimestampError::Serial(serial));
    }

    datetime!(1899-12-30 0:00)
        .checked_add(Duration::milliseconds(millis as i64))
        .ok_or(TimestampError::Serial(serial))
}

struct Cursor<'a> {
    tokens: &'a [(Token, &'a str)],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn peek(&self) -> Option<Token> {
        self.tokens.get(self.pos).map(|(token, _)| *token)
    }

    fn next(&mut self) -> Option<(Token, &'a str)> {
        let token = self.tokens.get(self.pos).copied();
        self.pos += 1;
        token
    }

    fn number(&mut self) -> Result<&'a str, TimestampError> {
        match self.next() {
            Some((Token::Number, slice)) => Ok(slice),
            Some((_, slice)) => Err(TimestampError::Unexpected(slice.to_string())),
            None => Err(TimestampError::Incomplete),
        }
    }

    fn expect(&mut self, expected: Token) -> Result<(), TimestampError> {
        match self.next() {
            Some((token, _)) if token == expected => Ok(()),
            Some((_, slice)) => Err(TimestampError::Unexpected(slice.to_string())),
            None => Err(TimestampError::Incomplete),
        }
    }

    fn separator(&mut self) -> Result<Token, TimestampError> {
        match self.next() {
            Some((token @ (Token::Dash | Token::Slash | Token::Dot), _)) => Ok(token),
            Some((_, slice)) => Err(TimestampError::Unexpected(slice.to_string())),
            None => Err(TimestampError::Incomplete),
        }
    }

    fn date(&mut self) -> Result<Date, TimestampError> {
        let first = self.number()?;
        let separator = self.separator()?;
        let second = self.number()?;
        self.expect(separator)?;
        let third = self.number()?;

        let (year, month, day) = if first.len() == 4 {
            (first, second, third)
        } else if third.len() != 4 {
            return Err(TimestampError::Unexpected(third.to_string()));
        } else if separator == Token::Dot {
            (third, second, first)
        } else {
            (third, first, second)
        };

        let month = Month::try_from(month.parse::<u8>()?)?;
        let year: i32 = year.parse()?;
        let day: u8 = day.parse()?;
        Ok(Date::from_calendar_date(year, month, day)?)
    }

    fn time(&mut self) -> Result<Time, TimestampError> {
        match self.peek() {
            None => return Ok(Time::MIDNIGHT),
            Some(Token::T) => {
                self.next();
            }
            Some(_) => (),
        }

        let hour: u8 = self.number()?.parse()?;
        self.expect(Token::Colon)?;
        let minute: u8 = self.number()?.parse()?;

        let mut second: u8 = 0;
        let mut nanosecond: u32 = 0;
        if self.peek() == Some(Token::Colon) {
            self.next();
            second = self.number()?.parse()?;
            if self.peek() == Some(Token::Dot) {
                self.next();
                nanosecond = fraction_to_nanos(self.number()?)?;
            }
        }

        Ok(Time::from_hms_nano(hour, minute, second, nanosecond)?)
    }
}

fn fraction_to_nanos(digits: &str) -> Result<u32, TimestampError> {
    let digits = &digits[..digits.len().min(9)];
    let value: u32 = digits.parse()?;
    Ok(value * 10u32.pow(9 - digits.len() as u32))
}
