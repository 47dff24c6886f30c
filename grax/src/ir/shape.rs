use std::fmt::Display;
use std::fmt::Formatter;

/// The element type of a tensor buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ElementType {
    Float32,
    Float16,
    Int32,
    Int8,
    Bool,
}

impl ElementType {
    /// Size of one element in bytes.
    pub fn bytes(&self) -> usize {
        match self {
            ElementType::Float32 => 4,
            ElementType::Float16 => 2,
            ElementType::Int32 => 4,
            ElementType::Int8 => 1,
            ElementType::Bool => 1,
        }
    }
}

impl Display for ElementType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ElementType::Float32 => "f32",
            ElementType::Float16 => "f16",
            ElementType::Int32 => "i32",
            ElementType::Int8 => "i8",
            ElementType::Bool => "bool",
        };
        write!(f, "{name}")
    }
}

/// The shape of an instruction's output buffer.
///
/// A shape is an element type plus dimension lengths and strides, measured in
/// elements. Strides allow non-contiguous views (transposes, broadcasts, and
/// sub-views into a shared arena). The shape with no dimensions is the "none"
/// shape carried by instructions that produce no buffer (returns and
/// synchronization markers); it has zero elements and zero bytes.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Shape {
    elem_type: ElementType,
    lens: Vec<usize>,
    strides: Vec<usize>,
}

impl Shape {
    /// A packed, row-major shape.
    pub fn new(elem_type: ElementType, lens: Vec<usize>) -> Shape {
        let strides = Shape::packed_strides(&lens);
        Shape {
            elem_type,
            lens,
            strides,
        }
    }
    /// A shape with explicit strides (e.g., a transpose or broadcast view).
    pub fn with_strides(elem_type: ElementType, lens: Vec<usize>, strides: Vec<usize>) -> Shape {
        debug_assert_eq!(lens.len(), strides.len());
        Shape {
            elem_type,
            lens,
            strides,
        }
    }
    /// The shape of an instruction that produces no buffer.
    pub fn none() -> Shape {
        Shape {
            elem_type: ElementType::Float32,
            lens: vec![],
            strides: vec![],
        }
    }
    pub fn scalar(elem_type: ElementType) -> Shape {
        Shape::new(elem_type, vec![1])
    }
    fn packed_strides(lens: &[usize]) -> Vec<usize> {
        let mut strides = vec![1; lens.len()];
        for i in (0..lens.len().saturating_sub(1)).rev() {
            strides[i] = strides[i + 1] * lens[i + 1];
        }
        strides
    }
    pub fn elem_type(&self) -> ElementType {
        self.elem_type
    }
    pub fn lens(&self) -> &[usize] {
        &self.lens
    }
    pub fn strides(&self) -> &[usize] {
        &self.strides
    }
    /// Number of addressable elements (the product of the lengths).
    pub fn elements(&self) -> usize {
        if self.lens.is_empty() {
            return 0;
        }
        self.lens.iter().product()
    }
    /// Number of elements the buffer must span, taking strides into account.
    ///
    /// For a broadcast view this is smaller than `elements()`.
    pub fn element_space(&self) -> usize {
        if self.elements() == 0 {
            return 0;
        }
        1 + self
            .lens
            .iter()
            .zip(self.strides.iter())
            .map(|(len, stride)| (len - 1) * stride)
            .sum::<usize>()
    }
    /// Size in bytes of the backing buffer.
    pub fn bytes(&self) -> usize {
        self.element_space() * self.elem_type.bytes()
    }
    /// Whether the strides are the packed, row-major strides for the lengths.
    pub fn standard(&self) -> bool {
        self.strides == Shape::packed_strides(&self.lens)
    }
    /// Whether any dimension is a broadcast (stride zero with length > 1).
    pub fn broadcasted(&self) -> bool {
        self.lens
            .iter()
            .zip(self.strides.iter())
            .any(|(len, stride)| *len > 1 && *stride == 0)
    }
    pub fn is_scalar(&self) -> bool {
        self.lens.len() == 1 && self.lens[0] == 1
    }
    pub fn is_none(&self) -> bool {
        self.lens.is_empty()
    }
    /// The same lengths with packed strides.
    pub fn packed(&self) -> Shape {
        Shape::new(self.elem_type, self.lens.clone())
    }
}

impl Display for Shape {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.is_none() {
            return write!(f, "none");
        }
        let lens = self
            .lens
            .iter()
            .map(|l| l.to_string())
            .collect::<Vec<String>>()
            .join("x");
        write!(f, "{}[{}]", self.elem_type, lens)?;
        if !self.standard() {
            let strides = self
                .strides
                .iter()
                .map(|s| s.to_string())
                .collect::<Vec<String>>()
                .join(",");
            write!(f, "{{{strides}}}")?;
        }
        Ok(())
    }
}

#[test]
fn test_packed_strides() {
    let s = Shape::new(ElementType::Float32, vec![2, 4, 6, 8]);
    assert_eq!(s.strides(), &[192, 48, 8, 1]);
    assert_eq!(s.elements(), 384);
    assert_eq!(s.bytes(), 384 * 4);
    assert!(s.standard());
}

#[test]
fn test_broadcast_space() {
    let s = Shape::with_strides(ElementType::Float32, vec![4, 2, 5, 3], vec![0, 3, 0, 1]);
    assert!(s.broadcasted());
    assert_eq!(s.elements(), 120);
    assert_eq!(s.element_space(), 6);
}

#[test]
fn test_none_shape() {
    let s = Shape::none();
    assert_eq!(s.elements(), 0);
    assert_eq!(s.bytes(), 0);
    assert_eq!(format!("{s}"), "none");
}
