//! Resolution and wall settings for a generation call.

use serde::{Deserialize, Serialize};

use crate::error::{BifurcationError, Result};

/// Whether to build a solid wall or only the inner surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeshDimension {
    /// Hexahedral elements through the wall.
    #[default]
    Solid,
    /// Quadrilateral elements on the inner surface only.
    Surface,
}

/// Generation parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BifurcationSettings {
    /// Elements around each tube. Must be even and at least 4.
    pub elements_count_around: usize,
    /// Elements along each trunk segment.
    pub elements_count_along_segment: usize,
    /// Element layers through the wall.
    pub elements_count_through_wall: usize,
    /// Wall thickness, uniform over the mesh.
    pub wall_thickness: f64,
    /// Solid wall or inner surface only.
    pub dimension: MeshDimension,
    /// Around-indices of trunk elements that bridge a change of local
    /// density; curvature next to them is evaluated one-sided.
    pub transit_elements: Vec<usize>,
    /// Identifier given to the first node.
    pub first_node_identifier: u32,
    /// Identifier given to the first element.
    pub first_element_identifier: u32,
}

impl Default for BifurcationSettings {
    fn default() -> Self {
        Self {
            elements_count_around: 8,
            elements_count_along_segment: 4,
            elements_count_through_wall: 1,
            wall_thickness: 0.1,
            dimension: MeshDimension::Solid,
            transit_elements: Vec::new(),
            first_node_identifier: 1,
            first_element_identifier: 1,
        }
    }
}

impl BifurcationSettings {
    /// Validate settings.
    pub fn validate(&self) -> Result<()> {
        if self.elements_count_around < 4 || self.elements_count_around % 2 != 0 {
            return Err(BifurcationError::degenerate(format!(
                "elements_count_around must be even and at least 4, got {}",
                self.elements_count_around
            )));
        }
        if self.elements_count_along_segment < 1 {
            return Err(BifurcationError::degenerate(
                "elements_count_along_segment must be at least 1",
            ));
        }
        if self.elements_count_through_wall < 1 {
            return Err(BifurcationError::degenerate(
                "elements_count_through_wall must be at least 1",
            ));
        }
        if !self.wall_thickness.is_finite() || self.wall_thickness < 0.0 {
            return Err(BifurcationError::degenerate(format!(
                "wall_thickness must be finite and non-negative, got {}",
                self.wall_thickness
            )));
        }
        if self.dimension == MeshDimension::Solid && self.wall_thickness == 0.0 {
            return Err(BifurcationError::degenerate(
                "solid mesh needs a non-zero wall_thickness",
            ));
        }
        if let Some(&bad) = self
            .transit_elements
            .iter()
            .find(|&&i| i >= self.elements_count_around)
        {
            return Err(BifurcationError::degenerate(format!(
                "transit element {bad} is outside 0..{}",
                self.elements_count_around
            )));
        }
        check_identifier_range("node", self.first_node_identifier, self.node_count())?;
        check_identifier_range("element", self.first_element_identifier, self.element_count())?;
        Ok(())
    }

    /// Number of element layers through the wall.
    pub fn element_layers(&self) -> usize {
        match self.dimension {
            MeshDimension::Solid => self.elements_count_through_wall,
            MeshDimension::Surface => 1,
        }
    }

    /// Nodes in the generated mesh: three trunks plus the five hub points,
    /// on every node layer. `None` if the count overflows.
    pub fn node_count(&self) -> Option<usize> {
        let stations = self.elements_count_along_segment.checked_add(1)?;
        let trunk = stations.checked_mul(self.elements_count_around)?;
        trunk
            .checked_mul(3)?
            .checked_add(5)?
            .checked_mul(self.node_layers())
    }

    /// Elements in the generated mesh: trunk elements plus one closure per
    /// around position, for all three branches. `None` if the count
    /// overflows.
    pub fn element_count(&self) -> Option<usize> {
        let rows = self.elements_count_along_segment.checked_add(1)?;
        rows.checked_mul(self.elements_count_around)?
            .checked_mul(3)?
            .checked_mul(self.element_layers())
    }

    /// Number of through-wall node layers actually generated.
    pub fn node_layers(&self) -> usize {
        match self.dimension {
            MeshDimension::Solid => self.elements_count_through_wall + 1,
            MeshDimension::Surface => 1,
        }
    }

    /// Per-element transition flags for one ring.
    pub fn transit_flags(&self) -> Vec<bool> {
        let mut flags = vec![false; self.elements_count_around];
        for &i in &self.transit_elements {
            if let Some(flag) = flags.get_mut(i) {
                *flag = true;
            }
        }
        flags
    }

    /// Parse settings from TOML. Missing keys take their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let settings: Self =
            toml::from_str(text).map_err(|e| BifurcationError::Settings(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Serialize settings to TOML.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string(self).map_err(|e| BifurcationError::Settings(e.to_string()))
    }
}

/// Fail unless `first + count` fits in a `u32`.
fn check_identifier_range(kind: &str, first: u32, count: Option<usize>) -> Result<()> {
    count
        .and_then(|c| u32::try_from(c).ok())
        .and_then(|c| first.checked_add(c))
        .map(|_| ())
        .ok_or_else(|| {
            BifurcationError::degenerate(format!(
                "{kind} identifiers starting at {first} overflow u32"
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings_valid() {
        assert!(BifurcationSettings::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_odd_or_small_around() {
        for around in [2, 3, 5, 7] {
            let settings = BifurcationSettings {
                elements_count_around: around,
                ..Default::default()
            };
            assert!(matches!(
                settings.validate(),
                Err(BifurcationError::DegenerateInput(_))
            ));
        }
    }

    #[test]
    fn test_rejects_zero_counts() {
        let along = BifurcationSettings {
            elements_count_along_segment: 0,
            ..Default::default()
        };
        assert!(along.validate().is_err());
        let wall = BifurcationSettings {
            elements_count_through_wall: 0,
            ..Default::default()
        };
        assert!(wall.validate().is_err());
    }

    #[test]
    fn test_zero_wall_only_for_surface() {
        let solid = BifurcationSettings {
            wall_thickness: 0.0,
            ..Default::default()
        };
        assert!(solid.validate().is_err());
        let surface = BifurcationSettings {
            wall_thickness: 0.0,
            dimension: MeshDimension::Surface,
            ..Default::default()
        };
        assert!(surface.validate().is_ok());
        assert_eq!(surface.node_layers(), 1);
    }

    #[test]
    fn test_transit_flags() {
        let settings = BifurcationSettings {
            elements_count_around: 4,
            transit_elements: vec![1, 3],
            ..Default::default()
        };
        assert_eq!(settings.transit_flags(), vec![false, true, false, true]);

        let bad = BifurcationSettings {
            elements_count_around: 4,
            transit_elements: vec![4],
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_toml_partial_and_roundtrip() {
        let settings = BifurcationSettings::from_toml_str(
            "elements_count_around = 12\nwall_thickness = 0.25\ndimension = \"surface\"\n",
        )
        .unwrap();
        assert_eq!(settings.elements_count_around, 12);
        assert_eq!(settings.elements_count_along_segment, 4);
        assert_eq!(settings.dimension, MeshDimension::Surface);

        let text = settings.to_toml_string().unwrap();
        assert_eq!(BifurcationSettings::from_toml_str(&text).unwrap(), settings);
    }

    #[test]
    fn test_toml_validation_errors_surface() {
        let err = BifurcationSettings::from_toml_str("elements_count_around = 5").unwrap_err();
        assert!(matches!(err, BifurcationError::DegenerateInput(_)));
        let err = BifurcationSettings::from_toml_str("elements_count_around = \"many\"").unwrap_err();
        assert!(matches!(err, BifurcationError::Settings(_)));
    }

    #[test]
    fn test_counts_match_layout() {
        let settings = BifurcationSettings::default();
        assert_eq!(settings.node_count(), Some((3 * 5 * 8 + 5) * 2));
        assert_eq!(settings.element_count(), Some(3 * 4 * 8 + 3 * 8));
        let surface = BifurcationSettings {
            dimension: MeshDimension::Surface,
            elements_count_through_wall: 3,
            ..Default::default()
        };
        assert_eq!(surface.element_layers(), 1);
        assert_eq!(surface.node_count(), Some(3 * 5 * 8 + 5));
    }

    #[test]
    fn test_identifier_overflow_rejected() {
        let nodes = BifurcationSettings {
            first_node_identifier: u32::MAX - 10,
            ..Default::default()
        };
        assert!(matches!(
            nodes.validate(),
            Err(BifurcationError::DegenerateInput(_))
        ));
        let elements = BifurcationSettings {
            first_element_identifier: u32::MAX - 10,
            ..Default::default()
        };
        assert!(matches!(
            elements.validate(),
            Err(BifurcationError::DegenerateInput(_))
        ));

        let settings = BifurcationSettings::default();
        let last = BifurcationSettings {
            first_node_identifier: u32::MAX - settings.node_count().unwrap() as u32,
            first_element_identifier: u32::MAX - settings.element_count().unwrap() as u32,
            ..settings
        };
        assert!(last.validate().is_ok());
    }
}
