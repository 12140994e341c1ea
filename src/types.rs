// Physical type registry, logical values, and table schema inputs.
//
// Every logical type maps to one of three storage lanes: long (i64 cells),
// int (i32 cells), or string. Floating-point types travel through the
// sortable encodings so that lane-integer ordering matches IEEE ordering;
// temporal types are normalized to epoch days / epoch milliseconds.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use crate::encoding;
use crate::error::{MemrisError, Result};

/// Compact, stable per-type dispatch code. The numeric values are part of
/// the engine contract and must not be reordered.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeCode {
    Long = 1,
    Int = 2,
    Short = 3,
    Byte = 4,
    Char = 5,
    Boolean = 6,
    Double = 7,
    Float = 8,
    String = 9,
    BigDecimal = 10,
    BigInteger = 11,
    Instant = 12,
    LocalDate = 13,
    LocalDateTime = 14,
    Date = 15,
}

impl TypeCode {
    pub const COUNT: usize = 15;

    pub const ALL: [TypeCode; Self::COUNT] = [
        TypeCode::Long,
        TypeCode::Int,
        TypeCode::Short,
        TypeCode::Byte,
        TypeCode::Char,
        TypeCode::Boolean,
        TypeCode::Double,
        TypeCode::Float,
        TypeCode::String,
        TypeCode::BigDecimal,
        TypeCode::BigInteger,
        TypeCode::Instant,
        TypeCode::LocalDate,
        TypeCode::LocalDateTime,
        TypeCode::Date,
    ];

    pub fn from_code(code: u8) -> Option<TypeCode> {
        Self::ALL.get(code.wrapping_sub(1) as usize).copied()
    }

    #[inline]
    pub fn code(self) -> u8 {
        self as u8
    }

    /// The physical storage lane for this logical type.
    pub fn lane(self) -> Lane {
        match self {
            TypeCode::Long
            | TypeCode::Double
            | TypeCode::Instant
            | TypeCode::LocalDate
            | TypeCode::LocalDateTime
            | TypeCode::Date => Lane::Long,
            TypeCode::Int
            | TypeCode::Short
            | TypeCode::Byte
            | TypeCode::Char
            | TypeCode::Boolean
            | TypeCode::Float => Lane::Int,
            TypeCode::String | TypeCode::BigDecimal | TypeCode::BigInteger => Lane::Str,
        }
    }

    pub fn is_temporal(self) -> bool {
        matches!(
            self,
            TypeCode::Instant | TypeCode::LocalDate | TypeCode::LocalDateTime | TypeCode::Date
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            TypeCode::Long => "long",
            TypeCode::Int => "int",
            TypeCode::Short => "short",
            TypeCode::Byte => "byte",
            TypeCode::Char => "char",
            TypeCode::Boolean => "boolean",
            TypeCode::Double => "double",
            TypeCode::Float => "float",
            TypeCode::String => "string",
            TypeCode::BigDecimal => "big-decimal",
            TypeCode::BigInteger => "big-integer",
            TypeCode::Instant => "instant",
            TypeCode::LocalDate => "local-date",
            TypeCode::LocalDateTime => "local-date-time",
            TypeCode::Date => "date",
        }
    }
}

/// Physical representation bucket used for column storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lane {
    Long,
    Int,
    Str,
}

impl Lane {
    pub fn name(self) -> &'static str {
        match self {
            Lane::Long => "long",
            Lane::Int => "int",
            Lane::Str => "string",
        }
    }
}

/// A logical column value as supplied by callers.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Long(i64),
    Int(i32),
    Short(i16),
    Byte(i8),
    Char(char),
    Bool(bool),
    Double(f64),
    Float(f32),
    Str(String),
    Instant(DateTime<Utc>),
    LocalDate(NaiveDate),
    LocalDateTime(NaiveDateTime),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Long(_) => "long",
            Value::Int(_) => "int",
            Value::Short(_) => "short",
            Value::Byte(_) => "byte",
            Value::Char(_) => "char",
            Value::Bool(_) => "boolean",
            Value::Double(_) => "double",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Instant(_) => "instant",
            Value::LocalDate(_) => "local-date",
            Value::LocalDateTime(_) => "local-date-time",
        }
    }
}

fn mismatch(column: usize, type_code: TypeCode, value: &Value) -> MemrisError {
    MemrisError::TypeMismatch {
        column,
        expected: type_code.name(),
        actual: value.kind_name(),
    }
}

/// Normalize a logical value to its long-lane representation.
/// `None` means null; incompatible values are a type mismatch.
pub fn long_lane_value(value: &Value, type_code: TypeCode, column: usize) -> Result<Option<i64>> {
    if value.is_null() {
        return Ok(None);
    }
    let lane = match (type_code, value) {
        (TypeCode::Long, Value::Long(v)) => *v,
        (TypeCode::Long, Value::Int(v)) => i64::from(*v),
        (TypeCode::Double, Value::Double(v)) => encoding::double_to_sortable_long(*v),
        (TypeCode::Instant, Value::Instant(ts)) => encoding::epoch_millis_of(*ts),
        (TypeCode::Instant, Value::Long(millis)) => *millis,
        (TypeCode::LocalDate, Value::LocalDate(date)) => encoding::epoch_day_of(*date),
        (TypeCode::LocalDate, Value::Long(day)) => *day,
        (TypeCode::LocalDateTime, Value::LocalDateTime(dt)) => encoding::utc_millis_of(*dt),
        (TypeCode::LocalDateTime, Value::Long(millis)) => *millis,
        (TypeCode::Date, Value::Instant(ts)) => encoding::epoch_millis_of(*ts),
        (TypeCode::Date, Value::Long(millis)) => *millis,
        _ => return Err(mismatch(column, type_code, value)),
    };
    Ok(Some(lane))
}

/// Normalize a logical value to its int-lane representation.
pub fn int_lane_value(value: &Value, type_code: TypeCode, column: usize) -> Result<Option<i32>> {
    if value.is_null() {
        return Ok(None);
    }
    let lane = match (type_code, value) {
        (TypeCode::Int, Value::Int(v)) => *v,
        (TypeCode::Short, Value::Short(v)) => i32::from(*v),
        (TypeCode::Byte, Value::Byte(v)) => i32::from(*v),
        (TypeCode::Char, Value::Char(c)) => *c as i32,
        (TypeCode::Boolean, Value::Bool(b)) => i32::from(*b),
        (TypeCode::Float, Value::Float(v)) => encoding::float_to_sortable_int(*v),
        _ => return Err(mismatch(column, type_code, value)),
    };
    Ok(Some(lane))
}

/// Normalize a logical value to its string-lane representation.
/// Big-decimal and big-integer values travel as their canonical text.
pub fn str_lane_value(value: &Value, type_code: TypeCode, column: usize) -> Result<Option<String>> {
    if value.is_null() {
        return Ok(None);
    }
    match (type_code, value) {
        (TypeCode::String | TypeCode::BigDecimal | TypeCode::BigInteger, Value::Str(s)) => {
            Ok(Some(s.clone()))
        }
        _ => Err(mismatch(column, type_code, value)),
    }
}

/// Reconstruct the logical value from a long-lane cell.
pub fn long_lane_to_value(lane: i64, type_code: TypeCode) -> Value {
    match type_code {
        TypeCode::Double => Value::Double(encoding::sortable_long_to_double(lane)),
        TypeCode::Instant | TypeCode::Date => encoding::instant_of_epoch_millis(lane)
            .map(Value::Instant)
            .unwrap_or(Value::Long(lane)),
        TypeCode::LocalDate => encoding::date_of_epoch_day(lane)
            .map(Value::LocalDate)
            .unwrap_or(Value::Long(lane)),
        TypeCode::LocalDateTime => encoding::date_time_of_utc_millis(lane)
            .map(Value::LocalDateTime)
            .unwrap_or(Value::Long(lane)),
        _ => Value::Long(lane),
    }
}

/// Reconstruct the logical value from an int-lane cell.
pub fn int_lane_to_value(lane: i32, type_code: TypeCode) -> Value {
    match type_code {
        TypeCode::Float => Value::Float(encoding::sortable_int_to_float(lane)),
        TypeCode::Boolean => Value::Bool(lane != 0),
        TypeCode::Short => Value::Short(lane as i16),
        TypeCode::Byte => Value::Byte(lane as i8),
        TypeCode::Char => Value::Char(char::from_u32(lane as u32).unwrap_or(char::REPLACEMENT_CHARACTER)),
        _ => Value::Int(lane),
    }
}

/// Schema description of one column.
#[derive(Debug, Clone)]
pub struct FieldMetadata {
    pub name: String,
    pub type_code: TypeCode,
    pub is_id: bool,
    pub primitive_non_null: bool,
}

impl FieldMetadata {
    pub fn new(name: impl Into<String>, type_code: TypeCode) -> Self {
        Self {
            name: name.into(),
            type_code,
            is_id: false,
            primitive_non_null: false,
        }
    }

    pub fn id(name: impl Into<String>, type_code: TypeCode) -> Self {
        Self {
            name: name.into(),
            type_code,
            is_id: true,
            primitive_non_null: true,
        }
    }

    pub fn primitive(name: impl Into<String>, type_code: TypeCode) -> Self {
        Self {
            name: name.into(),
            type_code,
            is_id: false,
            primitive_non_null: true,
        }
    }
}

/// Entity-to-table binding supplied by the repository layer.
#[derive(Debug, Clone)]
pub struct TableMetadata {
    pub entity_name: String,
    pub fields: Vec<FieldMetadata>,
}

impl TableMetadata {
    pub fn new(entity_name: impl Into<String>, fields: Vec<FieldMetadata>) -> Self {
        Self {
            entity_name: entity_name.into(),
            fields,
        }
    }

    /// Position of the id field, if the schema declares one.
    pub fn id_position(&self) -> Option<usize> {
        self.fields.iter().position(|f| f.is_id)
    }
}
