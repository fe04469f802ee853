//! Payloads carried by drag and drop between editor widgets.

use bevy_ecs::entity::Entity;

/// What is being dragged. Widgets ask for the variant they accept and
/// ignore the rest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DragDropPayload {
    Texture(String),
    Model(String),
    Entity(Entity),
    Material(String),
}

impl DragDropPayload {
    pub fn texture(&self) -> Option<&str> {
        match self {
            Self::Texture(path) => Some(path),
            _ => None,
        }
    }

    pub fn model(&self) -> Option<&str> {
        match self {
            Self::Model(path) => Some(path),
            _ => None,
        }
    }

    pub fn entity(&self) -> Option<Entity> {
        match self {
            Self::Entity(entity) => Some(*entity),
            _ => None,
        }
    }

    pub fn material(&self) -> Option<&str> {
        match self {
            Self::Material(path) => Some(path),
            _ => None,
        }
    }

    /// Short label shown next to the cursor while dragging.
    pub fn label(&self) -> String {
        match self {
            Self::Texture(path) | Self::Model(path) | Self::Material(path) => path
                .rsplit(|c: char| c == '/' || c == '\\')
                .next()
                .unwrap_or(path)
                .to_string(),
            Self::Entity(entity) => format!("Entity {entity:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accessors_match_variant() {
        let payload = DragDropPayload::Model(String::from("models/helmet.fmdl"));
        assert_eq!(payload.model(), Some("models/helmet.fmdl"));
        assert_eq!(payload.texture(), None);
        assert_eq!(payload.material(), None);
        assert_eq!(payload.entity(), None);

        let entity = Entity::from_raw(7);
        assert_eq!(DragDropPayload::Entity(entity).entity(), Some(entity));
    }

    #[test]
    fn test_label_strips_directories() {
        let payload = DragDropPayload::Texture(String::from("textures/stone/albedo.png"));
        assert_eq!(payload.label(), "albedo.png");
        let payload = DragDropPayload::Material(String::from("wood"));
        assert_eq!(payload.label(), "wood");
    }
}
