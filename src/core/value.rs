//! Purpose: The dynamically typed value exchanged with compiled modules.
//! Exports: `DynamicValue`, `ValueKind`, `ElementType`.
//! Role: Recursive tagged union behind DynamicValue handles; the boundary only marshals it.
//! Invariants: The discriminant never changes after construction.
//! Invariants: Container accessors re-check the caller's expected length before materializing.
//! Invariants: Dict entries keep insertion order; a repeated key keeps its first slot and its last value.
use std::fmt;

use crate::core::device::Device;
use crate::core::dtype::Complex64;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::tensor::Tensor;

/// Stable discriminant codes reported through `ctn_value_kind`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
#[repr(i32)]
pub enum ValueKind {
    None = 0,
    Bool = 1,
    Int = 2,
    Double = 3,
    ComplexDouble = 4,
    String = 5,
    Tensor = 6,
    Device = 7,
    List = 8,
    Tuple = 9,
    GenericDict = 10,
    Storage = 11,
    Capsule = 12,
    CustomClass = 13,
    Future = 14,
    RRef = 15,
    Quantizer = 16,
    Object = 17,
    Module = 18,
    PyObject = 19,
    Enum = 20,
    Stream = 21,
    Generator = 22,
    PtrType = 23,
}

impl ValueKind {
    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn name(self) -> &'static str {
        match self {
            ValueKind::None => "None",
            ValueKind::Bool => "Bool",
            ValueKind::Int => "Int",
            ValueKind::Double => "Double",
            ValueKind::ComplexDouble => "ComplexDouble",
            ValueKind::String => "String",
            ValueKind::Tensor => "Tensor",
            ValueKind::Device => "Device",
            ValueKind::List => "List",
            ValueKind::Tuple => "Tuple",
            ValueKind::GenericDict => "GenericDict",
            ValueKind::Storage => "Storage",
            ValueKind::Capsule => "Capsule",
            ValueKind::CustomClass => "CustomClass",
            ValueKind::Future => "Future",
            ValueKind::RRef => "RRef",
            ValueKind::Quantizer => "Quantizer",
            ValueKind::Object => "Object",
            ValueKind::Module => "Module",
            ValueKind::PyObject => "PyObject",
            ValueKind::Enum => "Enum",
            ValueKind::Stream => "Stream",
            ValueKind::Generator => "Generator",
            ValueKind::PtrType => "PtrType",
        }
    }

    /// Kinds that can be recognised but never built or unpacked at the boundary.
    pub fn is_inert(self) -> bool {
        self.code() >= ValueKind::Storage.code()
    }
}

/// Element type recorded on a list; `Any` for heterogeneous or nested lists.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ElementType {
    Any,
    Bool,
    Int,
    Double,
    ComplexDouble,
    Tensor,
}

impl ElementType {
    fn of(value: &DynamicValue) -> ElementType {
        match value {
            DynamicValue::Bool(_) => ElementType::Bool,
            DynamicValue::Int(_) => ElementType::Int,
            DynamicValue::Double(_) => ElementType::Double,
            DynamicValue::ComplexDouble(_) => ElementType::ComplexDouble,
            DynamicValue::Tensor(_) => ElementType::Tensor,
            _ => ElementType::Any,
        }
    }

    fn label(self) -> &'static str {
        match self {
            ElementType::Any => "List",
            ElementType::Bool => "BoolList",
            ElementType::Int => "IntList",
            ElementType::Double => "DoubleList",
            ElementType::ComplexDouble => "ComplexDoubleList",
            ElementType::Tensor => "TensorList",
        }
    }
}

#[derive(Clone, Debug)]
pub enum DynamicValue {
    None,
    Bool(bool),
    Int(i64),
    Double(f64),
    ComplexDouble(Complex64),
    String(String),
    Tensor(Tensor),
    Device(Device),
    List {
        element: ElementType,
        items: Vec<DynamicValue>,
    },
    Tuple(Vec<DynamicValue>),
    GenericDict(Vec<(DynamicValue, DynamicValue)>),
    Inert(ValueKind),
}

impl DynamicValue {
    pub fn from_bool_list(values: &[bool]) -> Self {
        Self::typed_list(ElementType::Bool, values.iter().map(|&v| DynamicValue::Bool(v)))
    }

    pub fn from_int_list(values: &[i64]) -> Self {
        Self::typed_list(ElementType::Int, values.iter().map(|&v| DynamicValue::Int(v)))
    }

    pub fn from_double_list(values: &[f64]) -> Self {
        Self::typed_list(ElementType::Double, values.iter().map(|&v| DynamicValue::Double(v)))
    }

    pub fn from_complex_list(values: &[Complex64]) -> Self {
        Self::typed_list(
            ElementType::ComplexDouble,
            values.iter().map(|&v| DynamicValue::ComplexDouble(v)),
        )
    }

    pub fn from_tensor_list(values: &[Tensor]) -> Self {
        Self::typed_list(ElementType::Tensor, values.iter().cloned().map(DynamicValue::Tensor))
    }

    fn typed_list(element: ElementType, items: impl Iterator<Item = DynamicValue>) -> Self {
        DynamicValue::List {
            element,
            items: items.collect(),
        }
    }

    /// Generic list; tagged with a typed element when every item shares one.
    pub fn from_list(items: Vec<DynamicValue>) -> Self {
        let element = match items.split_first() {
            Some((first, rest)) => {
                let candidate = ElementType::of(first);
                if rest.iter().all(|item| ElementType::of(item) == candidate) {
                    candidate
                } else {
                    ElementType::Any
                }
            }
            None => ElementType::Any,
        };
        DynamicValue::List { element, items }
    }

    pub fn from_tuple(items: Vec<DynamicValue>) -> Self {
        DynamicValue::Tuple(items)
    }

    pub fn from_generic_dict(keys: Vec<DynamicValue>, values: Vec<DynamicValue>) -> Result<Self> {
        if keys.len() != values.len() {
            return Err(Error::length_mismatch(keys.len(), values.len()));
        }
        let mut entries: Vec<(DynamicValue, DynamicValue)> = Vec::with_capacity(keys.len());
        for (key, value) in keys.into_iter().zip(values) {
            if !key.is_valid_dict_key() {
                return Err(Error::new(ErrorKind::Construction).with_message(format!(
                    "dict keys must be None, Bool, Int, Double, String, Tensor or Device, got {}",
                    key.kind().name()
                )));
            }
            match entries.iter_mut().find(|(existing, _)| existing.same_key(&key)) {
                Some(slot) => slot.1 = value,
                None => entries.push((key, value)),
            }
        }
        Ok(DynamicValue::GenericDict(entries))
    }

    /// Placeholder for a kind the boundary can name but not marshal.
    pub fn inert(kind: ValueKind) -> Result<Self> {
        if !kind.is_inert() {
            return Err(Error::new(ErrorKind::Construction)
                .with_message(format!("{} is not an inert value kind", kind.name())));
        }
        Ok(DynamicValue::Inert(kind))
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            DynamicValue::None => ValueKind::None,
            DynamicValue::Bool(_) => ValueKind::Bool,
            DynamicValue::Int(_) => ValueKind::Int,
            DynamicValue::Double(_) => ValueKind::Double,
            DynamicValue::ComplexDouble(_) => ValueKind::ComplexDouble,
            DynamicValue::String(_) => ValueKind::String,
            DynamicValue::Tensor(_) => ValueKind::Tensor,
            DynamicValue::Device(_) => ValueKind::Device,
            DynamicValue::List { .. } => ValueKind::List,
            DynamicValue::Tuple(_) => ValueKind::Tuple,
            DynamicValue::GenericDict(_) => ValueKind::GenericDict,
            DynamicValue::Inert(kind) => *kind,
        }
    }

    pub fn is_kind(&self, kind: ValueKind) -> bool {
        self.kind() == kind
    }

    pub fn is_scalar(&self) -> bool {
        matches!(
            self,
            DynamicValue::Bool(_)
                | DynamicValue::Int(_)
                | DynamicValue::Double(_)
                | DynamicValue::ComplexDouble(_)
        )
    }

    /// True for the matching typed list only; `ElementType::Any` matches every list.
    pub fn is_list_of(&self, element: ElementType) -> bool {
        match self {
            DynamicValue::List { element: actual, .. } => {
                element == ElementType::Any || *actual == element
            }
            _ => false,
        }
    }

    fn is_valid_dict_key(&self) -> bool {
        matches!(
            self,
            DynamicValue::None
                | DynamicValue::Bool(_)
                | DynamicValue::Int(_)
                | DynamicValue::Double(_)
                | DynamicValue::String(_)
                | DynamicValue::Tensor(_)
                | DynamicValue::Device(_)
        )
    }

    // Tensors compare by identity, everything else by value.
    fn same_key(&self, other: &DynamicValue) -> bool {
        match (self, other) {
            (DynamicValue::Tensor(a), DynamicValue::Tensor(b)) => same_tensor(a, b),
            (a, b) => a == b,
        }
    }

    fn describe(&self) -> &'static str {
        match self {
            DynamicValue::List { element, .. } => element.label(),
            other => other.kind().name(),
        }
    }

    fn mismatch(&self, expected: &str) -> Error {
        Error::type_mismatch(expected, self.describe())
    }

    pub fn tuple_len(&self) -> Result<usize> {
        match self {
            DynamicValue::Tuple(items) => Ok(items.len()),
            other => Err(other.mismatch("Tuple")),
        }
    }

    pub fn list_len(&self) -> Result<usize> {
        match self {
            DynamicValue::List { items, .. } => Ok(items.len()),
            other => Err(other.mismatch("List")),
        }
    }

    pub fn dict_len(&self) -> Result<usize> {
        match self {
            DynamicValue::GenericDict(entries) => Ok(entries.len()),
            other => Err(other.mismatch("GenericDict")),
        }
    }

    pub fn to_none(&self) -> Result<&'static str> {
        match self {
            DynamicValue::None => Ok("None"),
            other => Err(other.mismatch("None")),
        }
    }

    pub fn to_bool(&self) -> Result<bool> {
        match self {
            DynamicValue::Bool(v) => Ok(*v),
            other => Err(other.mismatch("Bool")),
        }
    }

    pub fn to_int(&self) -> Result<i64> {
        match self {
            DynamicValue::Int(v) => Ok(*v),
            other => Err(other.mismatch("Int")),
        }
    }

    pub fn to_double(&self) -> Result<f64> {
        match self {
            DynamicValue::Double(v) => Ok(*v),
            other => Err(other.mismatch("Double")),
        }
    }

    pub fn to_complex(&self) -> Result<Complex64> {
        match self {
            DynamicValue::ComplexDouble(v) => Ok(*v),
            other => Err(other.mismatch("ComplexDouble")),
        }
    }

    pub fn to_str(&self) -> Result<&str> {
        match self {
            DynamicValue::String(v) => Ok(v),
            other => Err(other.mismatch("String")),
        }
    }

    pub fn to_tensor(&self) -> Result<Tensor> {
        match self {
            DynamicValue::Tensor(v) => Ok(v.clone()),
            other => Err(other.mismatch("Tensor")),
        }
    }

    pub fn to_device(&self) -> Result<Device> {
        match self {
            DynamicValue::Device(v) => Ok(*v),
            other => Err(other.mismatch("Device")),
        }
    }

    fn typed_items(&self, element: ElementType, expected: usize) -> Result<&[DynamicValue]> {
        match self {
            DynamicValue::List { element: actual, items } if *actual == element => {
                check_len(expected, items.len())?;
                Ok(items)
            }
            other => Err(other.mismatch(element.label())),
        }
    }

    pub fn to_bool_list(&self, expected: usize) -> Result<Vec<bool>> {
        self.typed_items(ElementType::Bool, expected)?
            .iter()
            .map(DynamicValue::to_bool)
            .collect()
    }

    pub fn to_int_list(&self, expected: usize) -> Result<Vec<i64>> {
        self.typed_items(ElementType::Int, expected)?
            .iter()
            .map(DynamicValue::to_int)
            .collect()
    }

    pub fn to_double_list(&self, expected: usize) -> Result<Vec<f64>> {
        self.typed_items(ElementType::Double, expected)?
            .iter()
            .map(DynamicValue::to_double)
            .collect()
    }

    pub fn to_complex_list(&self, expected: usize) -> Result<Vec<Complex64>> {
        self.typed_items(ElementType::ComplexDouble, expected)?
            .iter()
            .map(DynamicValue::to_complex)
            .collect()
    }

    pub fn to_tensor_list(&self, expected: usize) -> Result<Vec<Tensor>> {
        self.typed_items(ElementType::Tensor, expected)?
            .iter()
            .map(DynamicValue::to_tensor)
            .collect()
    }

    pub fn to_list(&self, expected: usize) -> Result<Vec<DynamicValue>> {
        match self {
            DynamicValue::List { items, .. } => {
                check_len(expected, items.len())?;
                Ok(items.clone())
            }
            other => Err(other.mismatch("List")),
        }
    }

    pub fn to_tuple(&self, expected: usize) -> Result<Vec<DynamicValue>> {
        match self {
            DynamicValue::Tuple(items) => {
                check_len(expected, items.len())?;
                Ok(items.clone())
            }
            other => Err(other.mismatch("Tuple")),
        }
    }

    /// Parallel key and value arrays, paired by index.
    pub fn to_generic_dict(&self, expected: usize) -> Result<(Vec<DynamicValue>, Vec<DynamicValue>)> {
        match self {
            DynamicValue::GenericDict(entries) => {
                check_len(expected, entries.len())?;
                Ok(entries.iter().cloned().unzip())
            }
            other => Err(other.mismatch("GenericDict")),
        }
    }
}

fn check_len(expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(Error::length_mismatch(expected, actual));
    }
    Ok(())
}

fn same_tensor(a: &Tensor, b: &Tensor) -> bool {
    a.shares_storage_with(b) && a.dtype() == b.dtype() && a.shape() == b.shape()
}

impl PartialEq for DynamicValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (DynamicValue::None, DynamicValue::None) => true,
            (DynamicValue::Bool(a), DynamicValue::Bool(b)) => a == b,
            (DynamicValue::Int(a), DynamicValue::Int(b)) => a == b,
            (DynamicValue::Double(a), DynamicValue::Double(b)) => a == b,
            (DynamicValue::ComplexDouble(a), DynamicValue::ComplexDouble(b)) => a == b,
            (DynamicValue::String(a), DynamicValue::String(b)) => a == b,
            (DynamicValue::Tensor(a), DynamicValue::Tensor(b)) => same_tensor(a, b),
            (DynamicValue::Device(a), DynamicValue::Device(b)) => a == b,
            (
                DynamicValue::List { element: ea, items: a },
                DynamicValue::List { element: eb, items: b },
            ) => ea == eb && a == b,
            (DynamicValue::Tuple(a), DynamicValue::Tuple(b)) => a == b,
            (DynamicValue::GenericDict(a), DynamicValue::GenericDict(b)) => a == b,
            (DynamicValue::Inert(a), DynamicValue::Inert(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for DynamicValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DynamicValue::None => f.write_str("None"),
            DynamicValue::Bool(v) => f.write_str(if *v { "True" } else { "False" }),
            DynamicValue::Int(v) => write!(f, "{v}"),
            DynamicValue::Double(v) => write!(f, "{v}"),
            DynamicValue::ComplexDouble(v) => write!(f, "{}{:+}j", v.re, v.im),
            DynamicValue::String(v) => write!(f, "{v:?}"),
            DynamicValue::Tensor(v) => write!(f, "{v}"),
            DynamicValue::Device(v) => write!(f, "device(type='{v}')"),
            DynamicValue::List { items, .. } => write_seq(f, "[", items, "]"),
            DynamicValue::Tuple(items) => write_seq(f, "(", items, ")"),
            DynamicValue::GenericDict(entries) => {
                f.write_str("{")?;
                for (i, (key, value)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{key}: {value}")?;
                }
                f.write_str("}")
            }
            DynamicValue::Inert(kind) => write!(f, "<{}>", kind.name()),
        }
    }
}

fn write_seq(f: &mut fmt::Formatter<'_>, open: &str, items: &[DynamicValue], close: &str) -> fmt::Result {
    f.write_str(open)?;
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{item}")?;
    }
    f.write_str(close)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::dtype::Scalar;

    fn tensor(value: i64) -> Tensor {
        Tensor::scalar(Scalar::Int(value), crate::core::dtype::Dtype::Long).expect("tensor")
    }

    #[test]
    fn accessor_checks_discriminant() {
        let value = DynamicValue::Int(7);
        assert_eq!(value.to_int().expect("int"), 7);
        let err = value.to_double().expect_err("wrong kind");
        assert_eq!(err.kind(), ErrorKind::TypeMismatch);
        assert!(err.to_string().contains("expected Double but found Int"));
        assert!(value.is_scalar());
        assert!(!DynamicValue::String("x".into()).is_scalar());
    }

    #[test]
    fn typed_lists_are_lists() {
        let value = DynamicValue::from_int_list(&[1, 2, 3]);
        assert!(value.is_kind(ValueKind::List));
        assert!(value.is_list_of(ElementType::Int));
        assert!(value.is_list_of(ElementType::Any));
        assert!(!value.is_list_of(ElementType::Double));
        assert_eq!(value.list_len().expect("len"), 3);
        assert_eq!(value.to_int_list(3).expect("ints"), vec![1, 2, 3]);
        assert_eq!(value.to_list(3).expect("generic")[2], DynamicValue::Int(3));

        let err = value.to_int_list(2).expect_err("short buffer");
        assert_eq!(err.kind(), ErrorKind::LengthMismatch);
        assert_eq!(
            err.message(),
            Some("expected input array of size 2 but received array of size 3")
        );
        assert!(value.to_double_list(3).is_err());
    }

    #[test]
    fn generic_list_infers_element_type() {
        let uniform = DynamicValue::from_list(vec![DynamicValue::Double(1.0), DynamicValue::Double(2.0)]);
        assert!(uniform.is_list_of(ElementType::Double));
        let mixed = DynamicValue::from_list(vec![DynamicValue::Int(1), DynamicValue::Double(2.0)]);
        assert!(!mixed.is_list_of(ElementType::Int));
        assert!(mixed.to_int_list(2).is_err());
        assert!(DynamicValue::from_list(Vec::new()).is_list_of(ElementType::Any));
    }

    #[test]
    fn dict_keeps_first_slot_and_last_value() {
        let dict = DynamicValue::from_generic_dict(
            vec![
                DynamicValue::String("a".into()),
                DynamicValue::Int(1),
                DynamicValue::String("a".into()),
            ],
            vec![DynamicValue::Int(10), DynamicValue::Int(20), DynamicValue::Int(30)],
        )
        .expect("dict");
        assert_eq!(dict.dict_len().expect("len"), 2);
        let (keys, values) = dict.to_generic_dict(2).expect("entries");
        assert_eq!(keys[0], DynamicValue::String("a".into()));
        assert_eq!(values[0], DynamicValue::Int(30));
        assert_eq!(values[1], DynamicValue::Int(20));
    }

    #[test]
    fn dict_rejects_container_keys() {
        let err = DynamicValue::from_generic_dict(
            vec![DynamicValue::from_tuple(Vec::new())],
            vec![DynamicValue::None],
        )
        .expect_err("tuple key");
        assert_eq!(err.kind(), ErrorKind::Construction);
        assert!(DynamicValue::from_generic_dict(vec![DynamicValue::None], Vec::new()).is_err());
    }

    #[test]
    fn tensor_keys_compare_by_identity() {
        let a = tensor(1);
        let b = tensor(1);
        let dict = DynamicValue::from_generic_dict(
            vec![DynamicValue::Tensor(a.clone()), DynamicValue::Tensor(b), DynamicValue::Tensor(a)],
            vec![DynamicValue::Int(1), DynamicValue::Int(2), DynamicValue::Int(3)],
        )
        .expect("dict");
        assert_eq!(dict.dict_len().expect("len"), 2);
    }

    #[test]
    fn inert_kinds_answer_predicates_only() {
        let value = DynamicValue::inert(ValueKind::Future).expect("future");
        assert!(value.is_kind(ValueKind::Future));
        assert!(!value.is_scalar());
        assert!(value.list_len().is_err());
        assert!(DynamicValue::inert(ValueKind::Int).is_err());
    }

    #[test]
    fn none_renders_as_text() {
        assert_eq!(DynamicValue::None.to_none().expect("none"), "None");
        assert!(DynamicValue::Int(0).to_none().is_err());
        let nested = DynamicValue::from_tuple(vec![
            DynamicValue::Int(1),
            DynamicValue::from_list(vec![DynamicValue::Bool(true)]),
        ]);
        assert_eq!(nested.to_string(), "(1, [True])");
    }
}
