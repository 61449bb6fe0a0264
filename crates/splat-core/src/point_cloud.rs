//! Attribute registry for point-based geometry.

use std::collections::HashMap;

use crate::geometry_attribute::{GeometryAttribute, GeometryAttributeType, PointAttribute};
use crate::geometry_indices::PointIndex;
use crate::status::{error_status, ok_status, SplatError, Status};

/// An ordered collection of point attributes.
///
/// Attribute ids are dense and assigned in insertion order; deleting an
/// attribute shifts every later id down by one. Unique ids stay attached to
/// their attribute across deletions.
#[derive(Debug, Default, Clone)]
pub struct PointCloud {
    attributes: Vec<PointAttribute>,
    named_attribute_index: HashMap<GeometryAttributeType, Vec<i32>>,
    attribute_metadata: HashMap<u32, HashMap<String, String>>,
    num_points: usize,
}

impl PointCloud {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_num_points(&mut self, num_points: usize) {
        self.num_points = num_points;
    }

    pub fn num_points(&self) -> usize {
        self.num_points
    }

    /// Adds a fully constructed attribute and returns its id.
    pub fn add_attribute(&mut self, mut attribute: PointAttribute) -> i32 {
        if self.num_points == 0 && attribute.size() > 0 {
            self.num_points = attribute.size();
        }
        let id = self.attributes.len() as i32;
        attribute.set_unique_id(self.next_unique_id());
        self.named_attribute_index
            .entry(attribute.attribute_type())
            .or_default()
            .push(id);
        self.attributes.push(attribute);
        id
    }

    /// Creates an attribute from a template view with a fresh owned buffer
    /// holding `num_attribute_values` entries. Returns the new id, or an
    /// error when the template layout is unusable.
    pub fn add_attribute_from(
        &mut self,
        template_attribute: &GeometryAttribute,
        identity_mapped: bool,
        num_attribute_values: usize,
    ) -> Result<i32, SplatError> {
        let mut attribute = PointAttribute::new();
        attribute.init_from(template_attribute, identity_mapped, num_attribute_values)?;
        Ok(self.add_attribute(attribute))
    }

    pub fn num_attributes(&self) -> i32 {
        self.attributes.len() as i32
    }

    pub fn attribute(&self, att_id: i32) -> &PointAttribute {
        &self.attributes[att_id as usize]
    }

    pub fn attribute_mut(&mut self, att_id: i32) -> &mut PointAttribute {
        &mut self.attributes[att_id as usize]
    }

    /// Removes the attribute; ids greater than `att_id` shift down by one.
    pub fn delete_attribute(&mut self, att_id: i32) {
        if att_id < 0 || att_id as usize >= self.attributes.len() {
            return;
        }
        let removed = self.attributes.remove(att_id as usize);
        self.attribute_metadata.remove(&removed.unique_id());
        let entries = self
            .named_attribute_index
            .entry(removed.attribute_type())
            .or_default();
        entries.retain(|&id| id != att_id);
        for entries in self.named_attribute_index.values_mut() {
            for id in entries.iter_mut() {
                if *id > att_id {
                    *id -= 1;
                }
            }
        }
    }

    /// Id of the first attribute with the given role, or −1.
    pub fn named_attribute_id(&self, att_type: GeometryAttributeType) -> i32 {
        self.named_attribute_id_at(att_type, 0)
    }

    /// Id of the `k`-th attribute with the given role, or −1.
    pub fn named_attribute_id_at(&self, att_type: GeometryAttributeType, k: usize) -> i32 {
        match self.named_attribute_index.get(&att_type) {
            Some(ids) if k < ids.len() => ids[k],
            _ => -1,
        }
    }

    pub fn num_named_attributes(&self, att_type: GeometryAttributeType) -> usize {
        self.named_attribute_index
            .get(&att_type)
            .map_or(0, |ids| ids.len())
    }

    pub fn named_attribute(&self, att_type: GeometryAttributeType) -> Option<&PointAttribute> {
        let id = self.named_attribute_id(att_type);
        if id >= 0 {
            Some(&self.attributes[id as usize])
        } else {
            None
        }
    }

    pub fn attribute_id_by_unique_id(&self, unique_id: u32) -> i32 {
        for (i, att) in self.attributes.iter().enumerate() {
            if att.unique_id() == unique_id {
                return i as i32;
            }
        }
        -1
    }

    /// Attaches a metadata entry to an attribute. Metadata is advisory and
    /// never serialized.
    pub fn add_attribute_metadata(&mut self, att_id: i32, key: &str, value: &str) {
        if att_id < 0 || att_id as usize >= self.attributes.len() {
            return;
        }
        let unique_id = self.attributes[att_id as usize].unique_id();
        self.attribute_metadata
            .entry(unique_id)
            .or_default()
            .insert(key.to_string(), value.to_string());
    }

    /// Id of the first attribute carrying `key = value` metadata, or −1.
    pub fn get_attribute_id_by_metadata_entry(&self, key: &str, value: &str) -> i32 {
        for (i, att) in self.attributes.iter().enumerate() {
            if let Some(entries) = self.attribute_metadata.get(&att.unique_id()) {
                if entries.get(key).map(String::as_str) == Some(value) {
                    return i as i32;
                }
            }
        }
        -1
    }

    /// Collapses byte-equal value rows in every attribute.
    pub fn deduplicate_attribute_values(&mut self) -> Status {
        for att in self.attributes.iter_mut() {
            if att.size() == 0 {
                continue;
            }
            if att.deduplicate_values().is_err() {
                return Err(error_status("could not deduplicate attribute values"));
            }
        }
        ok_status()
    }

    /// Collapses points whose value mappings coincide in every attribute.
    /// Returns the old-point to new-point map when anything collapsed.
    pub fn deduplicate_point_ids(&mut self) -> Option<Vec<PointIndex>> {
        let num_points = self.num_points;
        let mut unique_point_map: HashMap<Vec<u32>, PointIndex> = HashMap::new();
        let mut index_map = vec![PointIndex(0); num_points];
        let mut unique_points: Vec<PointIndex> = Vec::new();
        for p in 0..num_points {
            let point = PointIndex(p as u32);
            let signature: Vec<u32> = self
                .attributes
                .iter()
                .map(|att| att.mapped_index(point).0)
                .collect();
            match unique_point_map.get(&signature) {
                Some(&unique) => index_map[p] = unique,
                None => {
                    let unique = PointIndex(unique_points.len() as u32);
                    unique_point_map.insert(signature, unique);
                    index_map[p] = unique;
                    unique_points.push(point);
                }
            }
        }
        if unique_points.len() == num_points {
            return None;
        }

        for att in self.attributes.iter_mut() {
            let kept: Vec<_> = unique_points.iter().map(|&p| att.mapped_index(p)).collect();
            att.set_explicit_mapping(unique_points.len());
            for (new_id, &entry) in kept.iter().enumerate() {
                att.set_point_map_entry(PointIndex(new_id as u32), entry);
            }
        }
        self.num_points = unique_points.len();
        Some(index_map)
    }

    fn next_unique_id(&self) -> u32 {
        self.attributes
            .iter()
            .map(|att| att.unique_id() + 1)
            .max()
            .unwrap_or(0)
    }
}
