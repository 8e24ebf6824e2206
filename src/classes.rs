//! Class registry for the PlantVillage taxonomy
//!
//! The classifier head emits one logit per entry of [`CLASS_NAMES`], in this
//! exact order. Labels follow the `"Plant___Disease"` / `"Plant___healthy"`
//! naming of the dataset folders the weights were trained on.

use serde::Serialize;

/// Number of classes the classifier head produces
pub const NUM_CLASSES: usize = 38;

/// Class names, ordered by output index
pub const CLASS_NAMES: [&str; NUM_CLASSES] = [
    "Apple___Apple_scab",
    "Apple___Black_rot",
    "Apple___Cedar_apple_rust",
    "Apple___healthy",
    "Blueberry___healthy",
    "Cherry___Powdery_mildew",
    "Cherry___healthy",
    "Corn___Cercospora_leaf_spot Gray_leaf_spot",
    "Corn___Common_rust",
    "Corn___Northern_Leaf_Blight",
    "Corn___healthy",
    "Grape___Black_rot",
    "Grape___Esca_(Black_Measles)",
    "Grape___Leaf_blight_(Isariopsis_Leaf_Spot)",
    "Grape___healthy",
    "Orange___Haunglongbing_(Citrus_greening)",
    "Peach___Bacterial_spot",
    "Peach___healthy",
    "Pepper,_bell___Bacterial_spot",
    "Pepper,_bell___healthy",
    "Potato___Early_blight",
    "Potato___Late_blight",
    "Potato___healthy",
    "Raspberry___healthy",
    "Soybean___healthy",
    "Squash___Powdery_mildew",
    "Strawberry___Leaf_scorch",
    "Strawberry___healthy",
    "Tomato___Bacterial_spot",
    "Tomato___Early_blight",
    "Tomato___Late_blight",
    "Tomato___Leaf_Mold",
    "Tomato___Septoria_leaf_spot",
    "Tomato___Spider_mites Two-spotted_spider_mite",
    "Tomato___Target_Spot",
    "Tomato___Tomato_Yellow_Leaf_Curl_Virus",
    "Tomato___Tomato_mosaic_virus",
    "Tomato___healthy",
];

/// A class label with its fixed position in the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ClassLabel {
    pub index: usize,
    pub name: &'static str,
}

impl ClassLabel {
    /// Whether this label describes a healthy plant
    pub fn is_healthy(&self) -> bool {
        self.name.ends_with("healthy")
    }

    /// Plant part of the label, e.g. `"Tomato"` for `"Tomato___Leaf_Mold"`
    pub fn plant_name(&self) -> &'static str {
        self.name.split("___").next().unwrap_or(self.name)
    }

    /// Condition part of the label, e.g. `"Leaf_Mold"`
    pub fn condition(&self) -> &'static str {
        self.name.split("___").nth(1).unwrap_or(self.name)
    }
}

impl std::fmt::Display for ClassLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name)
    }
}

/// Ordered, immutable list of class labels
///
/// Built once at startup and handed to the pipeline by reference; there is
/// no global mutable registry.
#[derive(Debug, Clone, Copy)]
pub struct ClassRegistry {
    names: &'static [&'static str],
}

impl Default for ClassRegistry {
    fn default() -> Self {
        Self::plant_village()
    }
}

impl ClassRegistry {
    /// The 38-class PlantVillage registry
    pub const fn plant_village() -> Self {
        Self {
            names: &CLASS_NAMES,
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Label at `index`, if in range
    pub fn get(&self, index: usize) -> Option<ClassLabel> {
        self.names
            .get(index)
            .map(|&name| ClassLabel { index, name })
    }

    /// Reverse lookup by exact label name
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|&n| n == name)
    }

    /// All labels in output order
    pub fn labels(&self) -> impl ExactSizeIterator<Item = ClassLabel> + '_ {
        self.names
            .iter()
            .enumerate()
            .map(|(index, &name)| ClassLabel { index, name })
    }

    pub fn names(&self) -> &'static [&'static str] {
        self.names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_has_38_unique_labels() {
        let registry = ClassRegistry::plant_village();
        assert_eq!(registry.len(), 38);

        let mut names: Vec<_> = registry.names().to_vec();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), 38);
    }

    #[test]
    fn test_lookup_by_index() {
        let registry = ClassRegistry::default();
        assert_eq!(registry.get(0).unwrap().name, "Apple___Apple_scab");
        assert_eq!(registry.get(37).unwrap().name, "Tomato___healthy");
        assert!(registry.get(38).is_none());
    }

    #[test]
    fn test_index_of() {
        let registry = ClassRegistry::default();
        assert_eq!(registry.index_of("Apple___Apple_scab"), Some(0));
        assert_eq!(registry.index_of("Corn___Common_rust"), Some(8));
        assert_eq!(registry.index_of("Background_without_leaves"), None);
    }

    #[test]
    fn test_labels_are_ordered() {
        let registry = ClassRegistry::default();
        for (i, label) in registry.labels().enumerate() {
            assert_eq!(label.index, i);
            assert_eq!(label.name, CLASS_NAMES[i]);
        }
    }

    #[test]
    fn test_label_parts() {
        let registry = ClassRegistry::default();
        let scab = registry.get(0).unwrap();
        assert_eq!(scab.plant_name(), "Apple");
        assert_eq!(scab.condition(), "Apple_scab");
        assert!(!scab.is_healthy());

        let pepper = registry.get(19).unwrap();
        assert_eq!(pepper.plant_name(), "Pepper,_bell");
        assert!(pepper.is_healthy());
    }
}
