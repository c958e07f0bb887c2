//! Mesh entities describing the coupling interface
//!
//! A [`ModelPart`] owns its nodes and elements in insertion-ordered arenas.
//! Elements refer to their nodes by arena index, so a `ModelPart` can be
//! cloned, moved or serialized without any pointer fix-ups.

use crate::error::{CoSimError, EntityKind};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Identifier of a node or element (always >= 1)
pub type IdType = u64;

/// Caller-defined element type tag
pub type ElementType = u32;

/// Point entity with an id and three coordinates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    id: IdType,
    coordinates: [f64; 3],
}

impl Node {
    pub fn id(&self) -> IdType {
        self.id
    }

    pub fn x(&self) -> f64 {
        self.coordinates[0]
    }

    pub fn y(&self) -> f64 {
        self.coordinates[1]
    }

    pub fn z(&self) -> f64 {
        self.coordinates[2]
    }

    pub fn coordinates(&self) -> [f64; 3] {
        self.coordinates
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Node; Id: {}", self.id)?;
        writeln!(
            f,
            "    Coordinates: [ {} | {} | {} ]",
            self.coordinates[0], self.coordinates[1], self.coordinates[2]
        )
    }
}

/// Position of a node inside its model part's node arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct NodeIndex(usize);

/// Element with an id, a type tag and an ordered list of node references
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    id: IdType,
    element_type: ElementType,
    nodes: Vec<NodeIndex>,
}

impl Element {
    pub fn id(&self) -> IdType {
        self.id
    }

    pub fn element_type(&self) -> ElementType {
        self.element_type
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

/// An element together with the model part that resolves its nodes
#[derive(Debug, Clone, Copy)]
pub struct ElementRef<'a> {
    element: &'a Element,
    model_part: &'a ModelPart,
}

impl<'a> ElementRef<'a> {
    pub fn element(&self) -> &'a Element {
        self.element
    }

    pub fn id(&self) -> IdType {
        self.element.id
    }

    pub fn element_type(&self) -> ElementType {
        self.element.element_type
    }

    pub fn node_count(&self) -> usize {
        self.element.nodes.len()
    }

    /// Nodes of this element in connectivity order
    pub fn nodes(&self) -> impl Iterator<Item = &'a Node> + 'a {
        let element = self.element;
        let model_part = self.model_part;
        element
            .nodes
            .iter()
            .map(move |index| &model_part.nodes[index.0])
    }

    pub fn node_ids(&self) -> impl Iterator<Item = IdType> + 'a {
        self.nodes().map(Node::id)
    }
}

impl fmt::Display for ElementRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Element; Id: {}", self.id())?;
        writeln!(f, "    Number of Nodes: {}", self.node_count())?;
        let ids: Vec<String> = self.node_ids().map(|id| id.to_string()).collect();
        writeln!(f, "    Node Ids: {}", ids.join(", "))
    }
}

/// Named container of nodes and elements exchanged between solvers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "ModelPartData", try_from = "ModelPartData")]
pub struct ModelPart {
    name: String,
    nodes: Vec<Node>,
    elements: Vec<Element>,
    node_lookup: HashMap<IdType, NodeIndex>,
    element_lookup: HashMap<IdType, usize>,
}

impl ModelPart {
    /// Create an empty model part
    ///
    /// Names must be non-empty and must not contain `.`.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(CoSimError::InvalidArgument(
                "ModelPart names must not be empty".to_string(),
            ));
        }
        if name.contains('.') {
            return Err(CoSimError::InvalidArgument(format!(
                "ModelPart names must not contain \".\" (used in \"{name}\")"
            )));
        }

        Ok(Self {
            name,
            nodes: Vec::new(),
            elements: Vec::new(),
            node_lookup: HashMap::new(),
            element_lookup: HashMap::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn number_of_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn number_of_elements(&self) -> usize {
        self.elements.len()
    }

    pub fn has_node(&self, id: IdType) -> bool {
        self.node_lookup.contains_key(&id)
    }

    pub fn has_element(&self, id: IdType) -> bool {
        self.element_lookup.contains_key(&id)
    }

    /// Add a node; fails if the id is taken
    pub fn create_new_node(&mut self, id: IdType, x: f64, y: f64, z: f64) -> Result<&Node> {
        check_id(id)?;
        if self.has_node(id) {
            return Err(CoSimError::DuplicateId {
                kind: EntityKind::Node,
                id,
            });
        }

        let index = NodeIndex(self.nodes.len());
        self.nodes.push(Node {
            id,
            coordinates: [x, y, z],
        });
        self.node_lookup.insert(id, index);
        Ok(&self.nodes[index.0])
    }

    /// Add an element connecting existing nodes, in the given order
    ///
    /// Nothing is inserted unless every node id resolves.
    pub fn create_new_element(
        &mut self,
        id: IdType,
        element_type: ElementType,
        node_ids: &[IdType],
    ) -> Result<ElementRef<'_>> {
        check_id(id)?;
        if self.has_element(id) {
            return Err(CoSimError::DuplicateId {
                kind: EntityKind::Element,
                id,
            });
        }
        if node_ids.is_empty() {
            return Err(CoSimError::InvalidArgument(format!(
                "Element with Id {id} has no nodes"
            )));
        }

        let nodes = node_ids
            .iter()
            .map(|&node_id| self.node_index(node_id))
            .collect::<Result<Vec<_>>>()?;

        let index = self.elements.len();
        self.elements.push(Element {
            id,
            element_type,
            nodes,
        });
        self.element_lookup.insert(id, index);
        Ok(ElementRef {
            element: &self.elements[index],
            model_part: &*self,
        })
    }

    pub fn get_node(&self, id: IdType) -> Result<&Node> {
        self.node_index(id).map(|index| &self.nodes[index.0])
    }

    pub fn get_element(&self, id: IdType) -> Result<ElementRef<'_>> {
        let index = self
            .element_lookup
            .get(&id)
            .copied()
            .ok_or(CoSimError::EntityNotFound {
                kind: EntityKind::Element,
                id,
            })?;
        Ok(self.element_ref(&self.elements[index]))
    }

    /// Nodes in insertion order
    pub fn nodes(&self) -> impl ExactSizeIterator<Item = &Node> {
        self.nodes.iter()
    }

    /// Elements in insertion order
    pub fn elements(&self) -> impl ExactSizeIterator<Item = ElementRef<'_>> {
        self.elements.iter().map(|element| self.element_ref(element))
    }

    /// Resolve the nodes of an element belonging to this model part
    pub fn nodes_of<'a>(&'a self, element: &'a Element) -> impl Iterator<Item = &'a Node> + 'a {
        self.element_ref(element).nodes()
    }

    fn element_ref<'a>(&'a self, element: &'a Element) -> ElementRef<'a> {
        ElementRef {
            element,
            model_part: self,
        }
    }

    fn node_index(&self, id: IdType) -> Result<NodeIndex> {
        self.node_lookup
            .get(&id)
            .copied()
            .ok_or(CoSimError::EntityNotFound {
                kind: EntityKind::Node,
                id,
            })
    }
}

fn check_id(id: IdType) -> Result<()> {
    if id < 1 {
        return Err(CoSimError::InvalidArgument(format!(
            "Id must be >= 1, got {id}"
        )));
    }
    Ok(())
}

impl fmt::Display for ModelPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ModelPart \"{}\"", self.name)?;
        writeln!(f, "    Number of Nodes: {}", self.number_of_nodes())?;
        writeln!(f, "    Number of Elements: {}", self.number_of_elements())
    }
}

/// Serialized form: elements carry node ids instead of arena indices
#[derive(Serialize, Deserialize)]
struct ModelPartData {
    name: String,
    nodes: Vec<Node>,
    elements: Vec<ElementData>,
}

#[derive(Serialize, Deserialize)]
struct ElementData {
    id: IdType,
    element_type: ElementType,
    node_ids: Vec<IdType>,
}

impl From<ModelPart> for ModelPartData {
    fn from(model_part: ModelPart) -> Self {
        let elements = model_part
            .elements
            .iter()
            .map(|element| ElementData {
                id: element.id,
                element_type: element.element_type,
                node_ids: element
                    .nodes
                    .iter()
                    .map(|index| model_part.nodes[index.0].id)
                    .collect(),
            })
            .collect();

        Self {
            name: model_part.name,
            nodes: model_part.nodes,
            elements,
        }
    }
}

impl TryFrom<ModelPartData> for ModelPart {
    type Error = CoSimError;

    fn try_from(data: ModelPartData) -> Result<Self> {
        let mut model_part = ModelPart::new(data.name)?;
        for node in data.nodes {
            let [x, y, z] = node.coordinates;
            model_part.create_new_node(node.id, x, y, z)?;
        }
        for element in data.elements {
            model_part.create_new_element(element.id, element.element_type, &element.node_ids)?;
        }
        Ok(model_part)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    const COORDS: [f64; 3] = [1.0, -2.7, 9.44];

    #[test]
    fn test_model_part_basics() {
        let model_part = ModelPart::new("for_test").unwrap();
        assert_eq!(model_part.name(), "for_test");
        assert_eq!(model_part.number_of_nodes(), 0);
        assert_eq!(model_part.number_of_elements(), 0);
    }

    #[test]
    fn test_invalid_names() {
        assert_eq!(
            ModelPart::new("").unwrap_err().kind(),
            ErrorKind::InvalidArgument
        );
        assert_eq!(
            ModelPart::new("fluid.interface").unwrap_err().kind(),
            ErrorKind::InvalidArgument
        );
    }

    #[test]
    fn test_create_and_get_node() {
        let mut model_part = ModelPart::new("for_test").unwrap();
        let node = model_part
            .create_new_node(691, COORDS[0], COORDS[1], COORDS[2])
            .unwrap();
        assert_eq!(node.id(), 691);
        assert_eq!(node.coordinates(), COORDS);

        let node = model_part.get_node(691).unwrap();
        assert_eq!(node.id(), 691);
        assert_eq!(node.x(), 1.0);
        assert_eq!(node.y(), -2.7);
        assert_eq!(node.z(), 9.44);
    }

    #[test]
    fn test_missing_node_names_id() {
        let mut model_part = ModelPart::new("for_test").unwrap();
        model_part.create_new_node(691, 0.0, 0.0, 0.0).unwrap();

        let err = model_part.get_node(692).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.to_string(), "Node with Id 692 does not exist");
    }

    #[test]
    fn test_duplicate_node_keeps_count() {
        let mut model_part = ModelPart::new("for_test").unwrap();
        model_part.create_new_node(1, 0.0, 0.0, 0.0).unwrap();

        let err = model_part.create_new_node(1, 5.0, 5.0, 5.0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DuplicateId);
        assert_eq!(err.to_string(), "The Node with Id 1 exists already");
        assert_eq!(model_part.number_of_nodes(), 1);
        assert_eq!(model_part.get_node(1).unwrap().coordinates(), [0.0; 3]);
    }

    #[test]
    fn test_zero_id_rejected() {
        let mut model_part = ModelPart::new("for_test").unwrap();
        let err = model_part.create_new_node(0, 0.0, 0.0, 0.0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_create_element() {
        let mut model_part = ModelPart::new("for_test").unwrap();
        model_part
            .create_new_node(691, COORDS[0], COORDS[1], COORDS[2])
            .unwrap();

        let element = model_part.create_new_element(47, 5, &[691]).unwrap();
        assert_eq!(element.id(), 47);
        assert_eq!(element.element_type(), 5);
        assert_eq!(element.node_count(), 1);

        let nodes: Vec<&Node> = element.nodes().collect();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].id(), 691);
        assert_eq!(nodes[0].coordinates(), COORDS);

        let element = model_part.get_element(47).unwrap().element();
        let resolved: Vec<IdType> = model_part.nodes_of(element).map(Node::id).collect();
        assert_eq!(resolved, vec![691]);
    }

    #[test]
    fn test_element_with_missing_node() {
        let mut model_part = ModelPart::new("for_test").unwrap();
        model_part.create_new_node(1, 0.0, 0.0, 0.0).unwrap();

        let err = model_part.create_new_element(3, 5, &[1, 2]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(err.to_string().contains("Node with Id 2"));
        assert_eq!(model_part.number_of_elements(), 0);
        assert!(!model_part.has_element(3));
    }

    #[test]
    fn test_element_without_nodes() {
        let mut model_part = ModelPart::new("for_test").unwrap();
        let err = model_part.create_new_element(1, 5, &[]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_duplicate_and_missing_element() {
        let mut model_part = ModelPart::new("for_test").unwrap();
        model_part.create_new_node(1, 0.0, 0.0, 0.0).unwrap();
        model_part.create_new_element(6, 5, &[1]).unwrap();

        let err = model_part.create_new_element(6, 5, &[1]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DuplicateId);
        assert_eq!(model_part.number_of_elements(), 1);

        let element = model_part.get_element(6).unwrap();
        assert_eq!(element.element_type(), 5);

        let err = model_part.get_element(7).unwrap_err();
        assert_eq!(err.to_string(), "Element with Id 7 does not exist");
    }

    #[test]
    fn test_node_and_element_ids_are_independent() {
        let mut model_part = ModelPart::new("for_test").unwrap();
        model_part.create_new_node(1, 0.0, 0.0, 0.0).unwrap();
        model_part.create_new_element(1, 5, &[1]).unwrap();
        assert!(model_part.has_node(1));
        assert!(model_part.has_element(1));
    }

    #[test]
    fn test_iteration_follows_insertion_order() {
        let mut model_part = ModelPart::new("for_test").unwrap();
        let node_ids = [2, 159, 61];
        model_part
            .create_new_node(node_ids[0], COORDS[0], COORDS[1], COORDS[2])
            .unwrap();
        model_part
            .create_new_node(node_ids[1], COORDS[1], COORDS[2], COORDS[0])
            .unwrap();
        model_part
            .create_new_node(node_ids[2], COORDS[2], COORDS[0], COORDS[1])
            .unwrap();

        let elem_ids = [21, 19, 961];
        let elem_types = [5, 5, 9];
        model_part.create_new_element(21, 5, &[2]).unwrap();
        model_part.create_new_element(19, 5, &[159]).unwrap();
        model_part.create_new_element(961, 9, &[159, 61]).unwrap();

        let ids: Vec<IdType> = model_part.nodes().map(Node::id).collect();
        assert_eq!(ids, node_ids);

        assert_eq!(model_part.elements().len(), 3);
        for (i, element) in model_part.elements().enumerate() {
            assert_eq!(element.id(), elem_ids[i]);
            assert_eq!(element.element_type(), elem_types[i]);
        }

        let last = model_part.get_element(961).unwrap();
        assert_eq!(last.node_ids().collect::<Vec<_>>(), vec![159, 61]);
    }

    #[test]
    fn test_display() {
        let mut model_part = ModelPart::new("for_test").unwrap();
        assert_eq!(
            model_part.to_string(),
            "ModelPart \"for_test\"\n    Number of Nodes: 0\n    Number of Elements: 0\n"
        );

        model_part
            .create_new_node(2, COORDS[0], COORDS[1], COORDS[2])
            .unwrap();
        model_part
            .create_new_node(159, COORDS[1], COORDS[2], COORDS[0])
            .unwrap();
        model_part
            .create_new_node(61, COORDS[2], COORDS[0], COORDS[1])
            .unwrap();
        model_part.create_new_element(15, 1, &[2]).unwrap();

        let summary = model_part.to_string();
        assert!(summary.contains("Number of Nodes: 3"));
        assert!(summary.contains("Number of Elements: 1"));
    }

    #[test]
    fn test_entity_display() {
        let mut model_part = ModelPart::new("for_test").unwrap();
        let node = model_part
            .create_new_node(16, COORDS[0], COORDS[1], COORDS[2])
            .unwrap();
        assert_eq!(
            node.to_string(),
            "Node; Id: 16\n    Coordinates: [ 1 | -2.7 | 9.44 ]\n"
        );

        model_part.create_new_node(1, 0.0, 0.0, 0.0).unwrap();
        model_part.create_new_node(22, 0.0, 0.0, 0.0).unwrap();
        model_part.create_new_node(321, 0.0, 0.0, 0.0).unwrap();
        let element = model_part.create_new_element(65, 5, &[1, 22, 321]).unwrap();
        assert_eq!(
            element.to_string(),
            "Element; Id: 65\n    Number of Nodes: 3\n    Node Ids: 1, 22, 321\n"
        );
    }

    #[test]
    fn test_clone_is_independent() {
        let mut original = ModelPart::new("for_test").unwrap();
        original.create_new_node(1, 0.0, 0.0, 0.0).unwrap();

        let mut copy = original.clone();
        copy.create_new_node(2, 1.0, 0.0, 0.0).unwrap();
        copy.create_new_element(1, 2, &[1, 2]).unwrap();

        assert_eq!(original.number_of_nodes(), 1);
        assert_eq!(original.number_of_elements(), 0);
        assert_eq!(copy.get_element(1).unwrap().node_ids().collect::<Vec<_>>(), vec![1, 2]);
    }
}
