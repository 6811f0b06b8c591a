use std::fmt;
use std::str::FromStr;
use crate::convert::ConvertError;
use crate::ir::DataType;

/// Float kinds the MPSX runtime stores natively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FloatKind {
    F32,
    F16,
}

static TYPE_TABLE: [(FloatKind, DataType); 2] = [
    (FloatKind::F32, DataType::F32),
    (FloatKind::F16, DataType::F16),
];

impl FloatKind {
    pub fn from_data_type(data_type: DataType) -> Option<FloatKind> {
        TYPE_TABLE
            .iter()
            .find(|(_, dt)| *dt == data_type)
            .map(|(kind, _)| *kind)
    }

    pub fn data_type(self) -> DataType {
        match self {
            FloatKind::F32 => DataType::F32,
            FloatKind::F16 => DataType::F16,
        }
    }

    pub fn code(self) -> i32 {
        self.data_type().code()
    }
}

impl TryFrom<DataType> for FloatKind {
    type Error = ConvertError;

    fn try_from(data_type: DataType) -> Result<Self, Self::Error> {
        FloatKind::from_data_type(data_type)
            .ok_or_else(|| ConvertError::UnsupportedType(format!("{:?} is not a target float kind", data_type)))
    }
}

impl TryFrom<i32> for FloatKind {
    type Error = ConvertError;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        FloatKind::try_from(DataType::from_code(code))
    }
}

impl FromStr for FloatKind {
    type Err = ConvertError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "f32" | "fp32" | "float" | "float32" => Ok(FloatKind::F32),
            "f16" | "fp16" | "half" | "float16" => Ok(FloatKind::F16),
            other => Err(ConvertError::UnsupportedType(format!("unknown float kind {}", other))),
        }
    }
}

impl fmt::Display for FloatKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FloatKind::F32 => write!(f, "f32"),
            FloatKind::F16 => write!(f, "f16"),
        }
    }
}
