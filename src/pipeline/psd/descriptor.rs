//! Photoshop action descriptors: the typed key/value trees that carry text
//! (`TySh`), placed-layer and vector-origination data.

use super::reader::Reader;
use crate::error::ParseError;

/// Nesting guard; real documents stay far below this.
const MAX_DEPTH: usize = 32;

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Descriptor {
    pub class_id: String,
    pub items: Vec<(String, Value)>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Value {
    Object(Descriptor),
    List(Vec<Value>),
    Double(f64),
    Unit { unit: String, value: f64 },
    Text(String),
    Enum { type_id: String, value: String },
    Integer(i32),
    LargeInteger(i64),
    Bool(bool),
    Class(String),
    Reference(Vec<String>),
    Raw(Vec<u8>),
}

impl Descriptor {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.items.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn text(&self, key: &str) -> Option<&str> {
        match self.get(key)? {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn raw(&self, key: &str) -> Option<&[u8]> {
        match self.get(key)? {
            Value::Raw(b) => Some(b),
            _ => None,
        }
    }

    pub fn object(&self, key: &str) -> Option<&Descriptor> {
        match self.get(key)? {
            Value::Object(d) => Some(d),
            _ => None,
        }
    }

    pub fn list(&self, key: &str) -> Option<&[Value]> {
        match self.get(key)? {
            Value::List(v) => Some(v),
            _ => None,
        }
    }

    /// Numeric value regardless of its stored representation.
    pub fn number(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(Value::as_number)
    }
}

impl Value {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Double(v) | Value::Unit { value: v, .. } => Some(*v),
            Value::Integer(v) => Some(f64::from(*v)),
            Value::LargeInteger(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Descriptor> {
        match self {
            Value::Object(d) => Some(d),
            _ => None,
        }
    }
}

/// Read a descriptor body (class name, class id, items).
pub(crate) fn read_descriptor(r: &mut Reader<'_>) -> Result<Descriptor, ParseError> {
    read_descriptor_at(r, 0)
}

fn read_descriptor_at(r: &mut Reader<'_>, depth: usize) -> Result<Descriptor, ParseError> {
    if depth > MAX_DEPTH {
        return Err(ParseError::Malformed("descriptor nesting too deep".into()));
    }
    let _class_name = r.unicode_string()?;
    let class_id = r.key()?;
    let count = r.u32()? as usize;
    let mut items = Vec::with_capacity(count.min(64));
    for _ in 0..count {
        let key = r.key()?;
        let value = read_value(r, depth)?;
        items.push((key, value));
    }
    Ok(Descriptor { class_id, items })
}

fn read_value(r: &mut Reader<'_>, depth: usize) -> Result<Value, ParseError> {
    let os_type = r.array::<4>()?;
    let value = match &os_type {
        b"Objc" | b"GlbO" => Value::Object(read_descriptor_at(r, depth + 1)?),
        b"VlLs" => {
            let count = r.u32()? as usize;
            let mut values = Vec::with_capacity(count.min(64));
            for _ in 0..count {
                values.push(read_value(r, depth + 1)?);
            }
            Value::List(values)
        }
        b"doub" => Value::Double(r.f64()?),
        b"UntF" => {
            let unit = String::from_utf8_lossy(&r.array::<4>()?).into_owned();
            Value::Unit {
                unit,
                value: r.f64()?,
            }
        }
        b"UnFl" => {
            let unit = String::from_utf8_lossy(&r.array::<4>()?).into_owned();
            let count = r.u32()? as usize;
            let mut values = Vec::with_capacity(count.min(64));
            for _ in 0..count {
                values.push(Value::Unit {
                    unit: unit.clone(),
                    value: r.f64()?,
                });
            }
            Value::List(values)
        }
        b"TEXT" => Value::Text(r.unicode_string()?),
        b"enum" => Value::Enum {
            type_id: r.key()?,
            value: r.key()?,
        },
        b"long" => Value::Integer(r.i32()?),
        b"comp" => Value::LargeInteger(r.i64()?),
        b"bool" => Value::Bool(r.u8()? != 0),
        b"type" | b"GlbC" => {
            let _name = r.unicode_string()?;
            Value::Class(r.key()?)
        }
        b"obj " => Value::Reference(read_reference(r)?),
        b"alis" | b"tdta" | b"Pth " => {
            let len = r.u32()? as usize;
            Value::Raw(r.take(len)?.to_vec())
        }
        other => {
            return Err(ParseError::Malformed(format!(
                "unsupported descriptor value type '{}'",
                String::from_utf8_lossy(other)
            )))
        }
    };
    Ok(value)
}

fn read_reference(r: &mut Reader<'_>) -> Result<Vec<String>, ParseError> {
    let count = r.u32()? as usize;
    let mut parts = Vec::with_capacity(count.min(16));
    for _ in 0..count {
        let form = r.array::<4>()?;
        let part = match &form {
            b"prop" => {
                let _name = r.unicode_string()?;
                let _class = r.key()?;
                r.key()?
            }
            b"Clss" => {
                let _name = r.unicode_string()?;
                r.key()?
            }
            b"Enmr" => {
                let _name = r.unicode_string()?;
                let _class = r.key()?;
                let _type = r.key()?;
                r.key()?
            }
            b"rele" => {
                let _name = r.unicode_string()?;
                let _class = r.key()?;
                r.i32()?.to_string()
            }
            b"Idnt" | b"indx" => r.u32()?.to_string(),
            b"name" => {
                let _name = r.unicode_string()?;
                let _class = r.key()?;
                r.unicode_string()?
            }
            other => {
                return Err(ParseError::Malformed(format!(
                    "unsupported reference form '{}'",
                    String::from_utf8_lossy(other)
                )))
            }
        };
        parts.push(part);
    }
    Ok(parts)
}
