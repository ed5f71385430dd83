use std::collections::HashMap;
use std::sync::Arc;

use super::id::NodeId;
use super::primitive::PrimitiveValue;
use crate::error::{NrbfError, Result};
use crate::metadata::{ClassShape, MemberType};

/// The content of one slot: a class member or an array element.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// No object.
    Null,
    /// An inline primitive (boxed when the slot is typed `Object`).
    Primitive(PrimitiveValue),
    /// A reference to an object in the same graph.
    Ref(NodeId),
}

impl Value {
    /// Returns the referenced node, if any.
    pub fn as_ref_node(&self) -> Option<NodeId> {
        match self {
            Self::Ref(id) => Some(*id),
            _ => None,
        }
    }

    /// Returns the primitive, if any.
    pub fn as_primitive(&self) -> Option<&PrimitiveValue> {
        match self {
            Self::Primitive(p) => Some(p),
            _ => None,
        }
    }

    /// Returns true for [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl From<NodeId> for Value {
    fn from(id: NodeId) -> Self {
        Self::Ref(id)
    }
}

impl From<PrimitiveValue> for Value {
    fn from(p: PrimitiveValue) -> Self {
        Self::Primitive(p)
    }
}

macro_rules! value_from_primitive {
    ($($t:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$t> for Value {
                fn from(v: $t) -> Self {
                    Self::Primitive(PrimitiveValue::$variant(v))
                }
            }
        )*
    };
}

value_from_primitive! {
    bool => Boolean,
    u8 => Byte,
    char => Char,
    f64 => Double,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    i8 => SByte,
    f32 => Single,
    u16 => UInt16,
    u32 => UInt32,
    u64 => UInt64,
}

/// An instance of a class: its shape plus one value per member.
#[derive(Debug, Clone)]
pub struct ClassInstance {
    /// The class layout. Instances decoded from `ClassWithId` records share
    /// the `Arc` of the record that defined the layout.
    pub shape: Arc<ClassShape>,
    /// Member values in shape order.
    pub values: Vec<Value>,
}

impl ClassInstance {
    /// Looks up a member value by name.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.shape
            .member_index(name)
            .and_then(|idx| self.values.get(idx))
    }
}

/// Dimensional layout of an array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArrayLayout {
    /// One dimension.
    Single,
    /// One dimension whose elements are arrays.
    Jagged,
    /// Several dimensions; items are stored row-major.
    Rectangular(Vec<usize>),
}

/// An array object.
#[derive(Debug, Clone)]
pub struct ArrayObject {
    /// Dimensional layout.
    pub layout: ArrayLayout,
    /// Per-dimension lower bounds; `None` means all zero.
    pub lower_bounds: Option<Vec<i32>>,
    /// Declared element type.
    pub element: MemberType,
    /// Elements.
    pub items: Vec<Value>,
}

impl ArrayObject {
    /// A single-dimensional array.
    pub fn single(element: MemberType, items: Vec<Value>) -> Self {
        Self {
            layout: ArrayLayout::Single,
            lower_bounds: None,
            element,
            items,
        }
    }

    /// A jagged array; `element` is the type of the inner arrays.
    pub fn jagged(element: MemberType, items: Vec<Value>) -> Self {
        Self {
            layout: ArrayLayout::Jagged,
            lower_bounds: None,
            element,
            items,
        }
    }

    /// A rectangular array with the given dimension lengths.
    pub fn rectangular(element: MemberType, lengths: Vec<usize>, items: Vec<Value>) -> Self {
        Self {
            layout: ArrayLayout::Rectangular(lengths),
            lower_bounds: None,
            element,
            items,
        }
    }

    /// Dimension lengths as written on the wire.
    pub fn lengths(&self) -> Vec<usize> {
        match &self.layout {
            ArrayLayout::Single | ArrayLayout::Jagged => vec![self.items.len()],
            ArrayLayout::Rectangular(lengths) => lengths.clone(),
        }
    }
}

/// A node of the object graph.
#[derive(Debug, Clone)]
pub enum Object {
    /// A class instance.
    Class(ClassInstance),
    /// A string object.
    String(String),
    /// An array object.
    Array(ArrayObject),
}

impl Object {
    /// Returns true if this object may occupy a slot declared as `declared`.
    ///
    /// Class slots accept any class instance: the declared type is the
    /// static type and the instance may be of a derived class.
    pub fn fits(&self, declared: &MemberType) -> bool {
        match (declared, self) {
            (MemberType::Primitive(_), _) => false,
            (MemberType::Object, _) => true,
            (MemberType::String, Object::String(_)) => true,
            (MemberType::SystemClass(_) | MemberType::Class { .. }, Object::Class(_)) => true,
            (MemberType::ObjectArray, Object::Array(_)) => true,
            (MemberType::StringArray, Object::Array(a)) => a.element == MemberType::String,
            (MemberType::PrimitiveArray(kind), Object::Array(a)) => {
                a.element == MemberType::Primitive(*kind)
            }
            _ => false,
        }
    }

    pub(crate) fn kind_name(&self) -> &'static str {
        match self {
            Self::Class(_) => "class",
            Self::String(_) => "string",
            Self::Array(_) => "array",
        }
    }
}

/// An arena holding every object of one graph.
///
/// References between objects are [`NodeId`]s into this arena, so shared
/// references and cycles are ordinary values: two slots that hold the same
/// `NodeId` point at the same instance.
///
/// ```rust
/// use std::sync::Arc;
/// use nrbf::{ClassShape, MemberType, ObjectGraph, Value};
///
/// let shape = Arc::new(
///     ClassShape::new("Demo.Node", Some("Demo")).member("next", MemberType::Object),
/// );
/// let mut graph = ObjectGraph::new();
/// let node = graph.add_class(shape, vec![Value::Null]);
/// graph.set_field(node, "next", Value::Ref(node))?;
/// graph.set_root(node);
/// # Ok::<(), nrbf::NrbfError>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct ObjectGraph {
    nodes: Vec<Object>,
    root: Option<NodeId>,
}

impl ObjectGraph {
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an object and returns its handle.
    pub fn add(&mut self, object: Object) -> NodeId {
        let id = NodeId::new(self.nodes.len());
        self.nodes.push(object);
        id
    }

    /// Adds a class instance.
    pub fn add_class(&mut self, shape: Arc<ClassShape>, values: Vec<Value>) -> NodeId {
        self.add(Object::Class(ClassInstance { shape, values }))
    }

    /// Adds a string object.
    pub fn add_string(&mut self, value: impl Into<String>) -> NodeId {
        self.add(Object::String(value.into()))
    }

    /// Adds an array object.
    pub fn add_array(&mut self, array: ArrayObject) -> NodeId {
        self.add(Object::Array(array))
    }

    /// Marks `id` as the root.
    pub fn set_root(&mut self, id: NodeId) {
        self.root = Some(id);
    }

    /// The root object, if one was set.
    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    /// Retrieves an object.
    pub fn get(&self, id: NodeId) -> Option<&Object> {
        self.nodes.get(id.index())
    }

    /// Retrieves an object mutably.
    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Object> {
        self.nodes.get_mut(id.index())
    }

    fn expect_node(&self, id: NodeId) -> Result<&Object> {
        self.get(id)
            .ok_or_else(|| NrbfError::Internal(format!("node {id} is not in this graph")))
    }

    /// Retrieves a class instance.
    pub fn class(&self, id: NodeId) -> Result<&ClassInstance> {
        match self.expect_node(id)? {
            Object::Class(c) => Ok(c),
            other => Err(NrbfError::unsupported(format!(
                "node {id} is a {}, expected a class",
                other.kind_name()
            ))),
        }
    }

    /// Retrieves a string object.
    pub fn string(&self, id: NodeId) -> Result<&str> {
        match self.expect_node(id)? {
            Object::String(s) => Ok(s),
            other => Err(NrbfError::unsupported(format!(
                "node {id} is a {}, expected a string",
                other.kind_name()
            ))),
        }
    }

    /// Retrieves an array object.
    pub fn array(&self, id: NodeId) -> Result<&ArrayObject> {
        match self.expect_node(id)? {
            Object::Array(a) => Ok(a),
            other => Err(NrbfError::unsupported(format!(
                "node {id} is a {}, expected an array",
                other.kind_name()
            ))),
        }
    }

    /// Follows the member `name` of class `id` to the node it references.
    pub fn follow(&self, id: NodeId, name: &str) -> Result<Option<NodeId>> {
        let class = self.class(id)?;
        let value = class.field(name).ok_or_else(|| {
            NrbfError::unsupported(format!("class {} has no member {name}", class.shape.name))
        })?;
        Ok(value.as_ref_node())
    }

    /// Replaces the member `name` of class `id`.
    ///
    /// This is how cycles are built: add the object first, then point one of
    /// its members back at it.
    pub fn set_field(&mut self, id: NodeId, name: &str, value: Value) -> Result<()> {
        let Some(Object::Class(class)) = self.get_mut(id) else {
            return Err(NrbfError::unsupported(format!("node {id} is not a class")));
        };
        let idx = class.shape.member_index(name).ok_or_else(|| {
            NrbfError::unsupported(format!("class {} has no member {name}", class.shape.name))
        })?;
        let slot = class
            .values
            .get_mut(idx)
            .ok_or_else(|| NrbfError::unsupported(format!("member {name} has no value slot")))?;
        *slot = value;
        Ok(())
    }

    /// Number of objects.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if the graph holds no objects.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Iterates over `(handle, object)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Object)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, o)| (NodeId::new(i), o))
    }

    /// Compares the subgraph reachable from `a` with the one reachable from
    /// `b` in `other`.
    ///
    /// References are matched through a bijection built during the walk, so
    /// two graphs compare equal only if they also agree on which slots share
    /// an instance and where the cycles are. Floats compare bitwise.
    pub fn structurally_eq(&self, a: NodeId, other: &ObjectGraph, b: NodeId) -> bool {
        let mut forward: HashMap<NodeId, NodeId> = HashMap::new();
        let mut backward: HashMap<NodeId, NodeId> = HashMap::new();
        let mut pending = vec![(a, b)];
        forward.insert(a, b);
        backward.insert(b, a);

        while let Some((left, right)) = pending.pop() {
            let (Some(lo), Some(ro)) = (self.get(left), other.get(right)) else {
                return false;
            };
            let (lv, rv): (&[Value], &[Value]) = match (lo, ro) {
                (Object::String(l), Object::String(r)) => {
                    if l != r {
                        return false;
                    }
                    continue;
                }
                (Object::Class(l), Object::Class(r)) => {
                    if l.shape != r.shape {
                        return false;
                    }
                    (l.values.as_slice(), r.values.as_slice())
                }
                (Object::Array(l), Object::Array(r)) => {
                    if l.layout != r.layout
                        || l.lower_bounds != r.lower_bounds
                        || l.element != r.element
                    {
                        return false;
                    }
                    (l.items.as_slice(), r.items.as_slice())
                }
                _ => return false,
            };
            if lv.len() != rv.len() {
                return false;
            }
            for (x, y) in lv.iter().zip(rv) {
                match (x, y) {
                    (Value::Null, Value::Null) => {}
                    (Value::Primitive(p), Value::Primitive(q)) => {
                        if !primitive_bits_eq(p, q) {
                            return false;
                        }
                    }
                    (Value::Ref(p), Value::Ref(q)) => {
                        match (forward.get(p), backward.get(q)) {
                            (Some(mapped), _) if mapped != q => return false,
                            (_, Some(mapped)) if mapped != p => return false,
                            (Some(_), Some(_)) => {}
                            _ => {
                                forward.insert(*p, *q);
                                backward.insert(*q, *p);
                                pending.push((*p, *q));
                            }
                        }
                    }
                    _ => return false,
                }
            }
        }
        true
    }
}

fn primitive_bits_eq(a: &PrimitiveValue, b: &PrimitiveValue) -> bool {
    match (a, b) {
        (PrimitiveValue::Double(x), PrimitiveValue::Double(y)) => x.to_bits() == y.to_bits(),
        (PrimitiveValue::Single(x), PrimitiveValue::Single(y)) => x.to_bits() == y.to_bits(),
        _ => a == b,
    }
}
