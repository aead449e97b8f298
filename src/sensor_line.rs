//! Parser for the lines the 8-sensor myoelectric board prints over serial:
//! eight comma separated readings followed by a line break, e.g.
//! `512,498,530,501,499,510,505,520\r\n`.

use nom::{
    character::complete::{char, line_ending, space0},
    combinator::{all_consuming, opt, recognize},
    multi::separated_list1,
    number::complete::double,
    sequence::{delimited, terminated},
    Finish, IResult,
};
use std::{fmt, str::FromStr};

/// Readings per line.
pub const NUM_SENSORS: usize = 8;

/// One line of readings. The text of every field is kept as the board sent
/// it, so the CSV file holds exactly what came over the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorLine {
    /// Readings as numbers.
    pub values: [f64; NUM_SENSORS],
    /// Readings as received, surrounding spaces removed.
    pub fields: [String; NUM_SENSORS],
}

/// Why a line was not recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SensorLineError {
    /// The line did not look like a list of numbers.
    Malformed(String),
    /// A list of numbers, but not eight of them.
    WrongCount(usize),
}

impl fmt::Display for SensorLineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed(line) => write!(f, "unexpected data format: {:?}", line),
            Self::WrongCount(n) => write!(f, "expected {} values, got {}", NUM_SENSORS, n),
        }
    }
}

impl std::error::Error for SensorLineError {}

fn parse_fields(s: &str) -> IResult<&str, Vec<&str>> {
    all_consuming(terminated(
        separated_list1(char(','), delimited(space0, recognize(double), space0)),
        opt(line_ending),
    ))(s)
}

impl FromStr for SensorLine {
    type Err = SensorLineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || SensorLineError::Malformed(s.trim().to_owned());
        let fields = match parse_fields(s.trim_start()).finish() {
            Ok((_remaining, fields)) => fields,
            Err(_) => return Err(malformed()),
        };
        if fields.len() != NUM_SENSORS {
            return Err(SensorLineError::WrongCount(fields.len()));
        }

        let mut values = [0.0; NUM_SENSORS];
        for (value, field) in values.iter_mut().zip(&fields) {
            *value = field.parse().map_err(|_| malformed())?;
        }
        let fields: [String; NUM_SENSORS] = fields
            .into_iter()
            .map(str::to_owned)
            .collect::<Vec<_>>()
            .try_into()
            .map_err(|v: Vec<String>| SensorLineError::WrongCount(v.len()))?;
        Ok(SensorLine { values, fields })
    }
}

impl SensorLine {
    /// The CSV header row the logger writes.
    pub fn csv_header() -> String {
        (1..=NUM_SENSORS)
            .map(|i| format!("Sensor{}", i))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// The fields joined by commas, as they were received.
    pub fn to_csv(&self) -> String {
        self.fields.join(",")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_1() {
        let line: SensorLine = "512,498,530,501,499,510,505,520\r\n".parse().unwrap();
        assert_eq!(
            line.values,
            [512.0, 498.0, 530.0, 501.0, 499.0, 510.0, 505.0, 520.0]
        );
        assert_eq!(line.to_csv(), "512,498,530,501,499,510,505,520");
    }

    #[test]
    fn test_2() {
        let line: SensorLine = "0.50, 1.25,-3,0,0,0,0,1023\n".parse().unwrap();
        assert_eq!(line.values[0], 0.5);
        assert_eq!(line.values[1], 1.25);
        assert_eq!(line.values[2], -3.0);
        assert_eq!(line.to_csv(), "0.50,1.25,-3,0,0,0,0,1023");
    }

    #[test]
    fn test_3() {
        assert_eq!(
            "1,2,3\n".parse::<SensorLine>(),
            Err(SensorLineError::WrongCount(3))
        );
        assert!(matches!(
            "\u{0}\u{0}garbage,1,2\n".parse::<SensorLine>(),
            Err(SensorLineError::Malformed(_))
        ));
        assert!(matches!(
            "1,2,3,4,5,6,7,8,\n".parse::<SensorLine>(),
            Err(SensorLineError::Malformed(_))
        ));
    }

    #[test]
    fn header_names_every_sensor() {
        assert_eq!(
            SensorLine::csv_header(),
            "Sensor1,Sensor2,Sensor3,Sensor4,Sensor5,Sensor6,Sensor7,Sensor8"
        );
    }
}
