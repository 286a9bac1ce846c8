//! XML configuration documents.
//!
//! Each document is read with quick-xml into private serde structs that
//! mirror the markup, then converted into a plain config struct with
//! defaults for anything optional.

use anyhow::{Context, Result};
use glam::Vec3;
use serde::Deserialize;
use std::path::Path;
use tracing::{info, warn};

use crate::error::{TesseraError, TesseraResult};
use crate::physics3d::{PhysicsConfig, StepFunction};

/// Settings of a [`Simulation2d`](crate::physics2d::Simulation2d).
#[derive(Debug, Clone, PartialEq)]
pub struct Simulation2dConfig {
    /// World up vector, normalized. Default: +Y.
    pub up: Vec3,
    /// Gravity acceleration. Default: zero.
    pub gravity: Vec3,
    /// Restitution applied to every contact. Default: 0.25.
    pub restitution: f32,
}

impl Default for Simulation2dConfig {
    fn default() -> Self {
        Self {
            up: Vec3::Y,
            gravity: Vec3::ZERO,
            restitution: 0.25,
        }
    }
}

#[derive(Debug, Deserialize)]
struct AxisXml {
    #[serde(rename = "@xAxis")]
    x: f32,
    #[serde(rename = "@yAxis")]
    y: f32,
    #[serde(rename = "@zAxis")]
    z: f32,
}

#[derive(Debug, Deserialize)]
struct ValueVecXml {
    #[serde(rename = "@xValue")]
    x: f32,
    #[serde(rename = "@yValue")]
    y: f32,
    #[serde(rename = "@zValue")]
    z: f32,
}

#[derive(Debug, Deserialize)]
struct ValueXml<T> {
    #[serde(rename = "@value")]
    value: T,
}

#[derive(Debug, Deserialize)]
struct Simulation2dXml {
    up: Option<AxisXml>,
    gravity: Option<ValueVecXml>,
    restitution: Option<ValueXml<f32>>,
}

impl Simulation2dConfig {
    /// Parse a `<simulation2D>` document.
    pub fn from_xml(text: &str) -> TesseraResult<Self> {
        let xml: Simulation2dXml = quick_xml::de::from_str(text)?;
        let mut config = Self::default();

        match xml.up {
            Some(up) => {
                let up = Vec3::new(up.x, up.y, up.z);
                match up.try_normalize() {
                    Some(n) => config.up = n,
                    None => warn!("Ignoring zero up vector in simulation2D config"),
                }
            }
            None => warn!("No <up> in simulation2D config, using {:?}", config.up),
        }
        match xml.gravity {
            Some(g) => config.gravity = Vec3::new(g.x, g.y, g.z),
            None => warn!("No <gravity> in simulation2D config, using {:?}", config.gravity),
        }
        if let Some(r) = xml.restitution {
            config.restitution = r.value;
        }
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read simulation config {:?}", path))?;
        let config = Self::from_xml(&text)
            .with_context(|| format!("Failed to parse simulation config {:?}", path))?;
        info!("Loaded simulation2D config from {:?}", path);
        Ok(config)
    }
}

/// One `<collisionMap>` entry: a line-set file and its rotation.
#[derive(Debug, Clone, PartialEq)]
pub struct CollisionMapEntry {
    pub id: u32,
    /// Rotation about the up axis in degrees.
    pub y_rotation: f32,
    pub file_type: String,
    pub file_name: String,
}

/// One `<tile>` mapping entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileMapping {
    pub tile_type: u32,
    pub collision_map_id: u32,
}

/// Collision world description for a [`CollisionMap`](crate::collision::CollisionMap).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollisionMapConfig {
    pub collision_maps: Vec<CollisionMapEntry>,
    pub tiles: Vec<TileMapping>,
}

#[derive(Debug, Deserialize)]
struct CollisionMapConfigXml {
    #[serde(rename = "collisionMaps", default)]
    collision_maps: CollisionMapsXml,
    #[serde(default)]
    mapping: MappingXml,
}

#[derive(Debug, Default, Deserialize)]
struct CollisionMapsXml {
    #[serde(rename = "collisionMap", default)]
    entries: Vec<CollisionMapXml>,
}

#[derive(Debug, Deserialize)]
struct CollisionMapXml {
    #[serde(rename = "@id")]
    id: u32,
    trans: Option<TransXml>,
    file: FileXml,
    #[serde(rename = "fileName")]
    file_name: FileNameXml,
}

#[derive(Debug, Deserialize)]
struct TransXml {
    #[serde(rename = "@yRotation", default)]
    y_rotation: f32,
}

#[derive(Debug, Deserialize)]
struct FileXml {
    #[serde(rename = "@type")]
    file_type: String,
}

#[derive(Debug, Deserialize)]
struct FileNameXml {
    #[serde(rename = "@name")]
    name: String,
}

#[derive(Debug, Default, Deserialize)]
struct MappingXml {
    #[serde(rename = "tile", default)]
    tiles: Vec<TileXml>,
}

#[derive(Debug, Deserialize)]
struct TileXml {
    #[serde(rename = "@type")]
    tile_type: u32,
    #[serde(rename = "@collisionMapId")]
    collision_map_id: u32,
}

impl CollisionMapConfig {
    /// Parse a `<collisionMapConfig>` document.
    pub fn from_xml(text: &str) -> TesseraResult<Self> {
        let xml: CollisionMapConfigXml = quick_xml::de::from_str(text)?;
        let collision_maps = xml
            .collision_maps
            .entries
            .into_iter()
            .map(|e| CollisionMapEntry {
                id: e.id,
                y_rotation: e.trans.map_or(0.0, |t| t.y_rotation),
                file_type: e.file.file_type,
                file_name: e.file_name.name,
            })
            .collect();
        let tiles = xml
            .mapping
            .tiles
            .into_iter()
            .map(|t| TileMapping {
                tile_type: t.tile_type,
                collision_map_id: t.collision_map_id,
            })
            .collect();
        Ok(Self {
            collision_maps,
            tiles,
        })
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read collision map config {:?}", path))?;
        Self::from_xml(&text)
            .with_context(|| format!("Failed to parse collision map config {:?}", path))
    }
}

/// Contents of a `<physics>` module document.
#[derive(Debug, Clone, PartialEq)]
pub struct PhysicsModuleConfig {
    pub gravity: Vec3,
    pub step_size: f32,
    pub step_function: StepFunction,
    /// Object manager type name, handed to the host.
    pub object_manager: String,
    /// Synchronisation model type name, resolved through the model registry.
    pub synchronisation_model: String,
}

#[derive(Debug, Deserialize)]
struct PhysicsXml {
    simulation: Option<SimulationXml>,
    #[serde(rename = "objectManager")]
    object_manager: Option<TypeXml>,
    #[serde(rename = "synchronisationModel")]
    synchronisation_model: Option<TypeXml>,
}

#[derive(Debug, Deserialize)]
struct SimulationXml {
    gravity: Option<XyzXml>,
    #[serde(rename = "stepSize")]
    step_size: Option<ValueXml<f32>>,
    #[serde(rename = "stepFunction")]
    step_function: Option<StepFunctionXml>,
}

#[derive(Debug, Deserialize)]
struct XyzXml {
    #[serde(rename = "@x")]
    x: f32,
    #[serde(rename = "@y")]
    y: f32,
    #[serde(rename = "@z")]
    z: f32,
}

#[derive(Debug, Deserialize)]
struct StepFunctionXml {
    #[serde(rename = "@name")]
    name: String,
    #[serde(rename = "@numberOfSteps")]
    number_of_steps: Option<i32>,
}

#[derive(Debug, Deserialize)]
struct TypeXml {
    #[serde(rename = "@type")]
    type_name: String,
}

fn parse_step_function(xml: &StepFunctionXml) -> Option<StepFunction> {
    match xml.name.as_str() {
        "STEP" | "NORMAL" => Some(StepFunction::Step),
        "QUICKSTEP" => Some(StepFunction::QuickStep),
        "STEPFAST1" => {
            let iterations = match xml.number_of_steps {
                Some(n) if n > 0 => n as u32,
                _ => StepFunction::DEFAULT_FAST_ITERATIONS,
            };
            Some(StepFunction::StepFast1 { iterations })
        }
        _ => None,
    }
}

impl PhysicsModuleConfig {
    /// Parse a `<physics>` document.
    ///
    /// `<simulation>` with `<gravity>` and `<stepSize>`, `<objectManager>`
    /// and `<synchronisationModel>` are required.
    pub fn from_xml(text: &str) -> TesseraResult<Self> {
        let xml: PhysicsXml = quick_xml::de::from_str(text)?;
        let simulation = xml
            .simulation
            .ok_or_else(|| TesseraError::MissingElement("simulation".to_string()))?;
        let object_manager = xml
            .object_manager
            .ok_or_else(|| TesseraError::MissingElement("objectManager".to_string()))?;
        let synchronisation_model = xml
            .synchronisation_model
            .ok_or_else(|| TesseraError::MissingElement("synchronisationModel".to_string()))?;
        let gravity = simulation
            .gravity
            .ok_or_else(|| TesseraError::MissingElement("gravity".to_string()))?;
        let step_size = simulation
            .step_size
            .ok_or_else(|| TesseraError::MissingElement("stepSize".to_string()))?;
        if !(step_size.value.is_finite() && step_size.value > 0.0) {
            return Err(TesseraError::InvalidStepSize(step_size.value));
        }

        let mut step_function = StepFunction::default();
        if let Some(sf) = &simulation.step_function {
            match parse_step_function(sf) {
                Some(f) => {
                    info!("Using step function {:?}", f);
                    step_function = f;
                }
                None => warn!("Unknown step function {}, using {:?}", sf.name, step_function),
            }
        }

        Ok(Self {
            gravity: Vec3::new(gravity.x, gravity.y, gravity.z),
            step_size: step_size.value,
            step_function,
            object_manager: object_manager.type_name,
            synchronisation_model: synchronisation_model.type_name,
        })
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read physics config {:?}", path))?;
        Self::from_xml(&text).with_context(|| format!("Failed to parse physics config {:?}", path))
    }

    /// Apply onto `base`, keeping fields the document does not cover.
    pub fn to_physics_config(&self, base: &PhysicsConfig) -> PhysicsConfig {
        PhysicsConfig {
            gravity: self.gravity,
            step_size: self.step_size,
            step_function: self.step_function,
            synchronisation_model: self.synchronisation_model.clone(),
            ..base.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simulation2d_config() {
        let config = Simulation2dConfig::from_xml(
            r#"<simulation2D>
  <up xAxis="0" yAxis="2" zAxis="0"/>
  <gravity xValue="0" yValue="-9.81" zValue="0"/>
</simulation2D>"#,
        )
        .unwrap();
        assert_eq!(config.up, Vec3::Y);
        assert_eq!(config.gravity, Vec3::new(0.0, -9.81, 0.0));
        assert_eq!(config.restitution, 0.25);
    }

    #[test]
    fn test_simulation2d_config_defaults() {
        let config = Simulation2dConfig::from_xml("<simulation2D/>").unwrap();
        assert_eq!(config, Simulation2dConfig::default());

        let config = Simulation2dConfig::from_xml(
            r#"<simulation2D><restitution value="1"/></simulation2D>"#,
        )
        .unwrap();
        assert_eq!(config.restitution, 1.0);
    }

    #[test]
    fn test_simulation2d_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sim.xml");
        std::fs::write(
            &path,
            r#"<simulation2D><up xAxis="1" yAxis="0" zAxis="0"/></simulation2D>"#,
        )
        .unwrap();
        assert_eq!(Simulation2dConfig::from_file(&path).unwrap().up, Vec3::X);
        assert!(Simulation2dConfig::from_file(dir.path().join("none.xml")).is_err());
    }

    #[test]
    fn test_collision_map_config() {
        let config = CollisionMapConfig::from_xml(
            r#"<collisionMapConfig>
  <collisionMaps>
    <collisionMap id="4">
      <trans yRotation="180"/>
      <file type="lines"/>
      <fileName name="corner.lines"/>
    </collisionMap>
    <collisionMap id="5">
      <file type="mesh"/>
      <fileName name="straight.obj"/>
    </collisionMap>
  </collisionMaps>
  <mapping>
    <tile type="1" collisionMapId="4"/>
  </mapping>
</collisionMapConfig>"#,
        )
        .unwrap();
        assert_eq!(config.collision_maps.len(), 2);
        assert_eq!(
            config.collision_maps[0],
            CollisionMapEntry {
                id: 4,
                y_rotation: 180.0,
                file_type: "lines".to_string(),
                file_name: "corner.lines".to_string(),
            }
        );
        assert_eq!(config.collision_maps[1].y_rotation, 0.0);
        assert_eq!(
            config.tiles,
            vec![TileMapping {
                tile_type: 1,
                collision_map_id: 4
            }]
        );
    }

    #[test]
    fn test_physics_module_config() {
        let config = PhysicsModuleConfig::from_xml(
            r#"<physics>
  <simulation>
    <gravity x="0" y="-1.5" z="0"/>
    <stepSize value="0.02"/>
    <stepFunction name="STEPFAST1" numberOfSteps="5"/>
  </simulation>
  <objectManager type="SimplePhysicsObjectManager"/>
  <synchronisationModel type="Local"/>
</physics>"#,
        )
        .unwrap();
        assert_eq!(config.gravity, Vec3::new(0.0, -1.5, 0.0));
        assert_eq!(config.step_size, 0.02);
        assert_eq!(config.step_function, StepFunction::StepFast1 { iterations: 5 });
        assert_eq!(config.object_manager, "SimplePhysicsObjectManager");

        let physics = config.to_physics_config(&PhysicsConfig::default());
        assert_eq!(physics.step_size, 0.02);
        assert_eq!(physics.synchronisation_model, "Local");
    }

    #[test]
    fn test_physics_module_config_unknown_step_function() {
        let config = PhysicsModuleConfig::from_xml(
            r#"<physics>
  <simulation>
    <gravity x="0" y="0" z="0"/>
    <stepSize value="0.01"/>
    <stepFunction name="RK4"/>
  </simulation>
  <objectManager type="M"/>
  <synchronisationModel type="Local"/>
</physics>"#,
        )
        .unwrap();
        assert_eq!(config.step_function, StepFunction::Step);
    }

    #[test]
    fn test_physics_module_config_rejects_bad_step_size() {
        for value in ["0", "-0.01"] {
            let text = format!(
                r#"<physics>
  <simulation><gravity x="0" y="0" z="0"/><stepSize value="{}"/></simulation>
  <objectManager type="M"/>
  <synchronisationModel type="Local"/>
</physics>"#,
                value
            );
            let err = PhysicsModuleConfig::from_xml(&text).unwrap_err();
            assert!(
                matches!(err, TesseraError::InvalidStepSize(_)),
                "stepSize {} gave {:?}",
                value,
                err
            );
        }
    }

    #[test]
    fn test_physics_module_config_missing_element() {
        let err = PhysicsModuleConfig::from_xml(
            r#"<physics>
  <simulation><gravity x="0" y="0" z="0"/><stepSize value="0.01"/></simulation>
  <synchronisationModel type="Local"/>
</physics>"#,
        )
        .unwrap_err();
        assert!(matches!(err, TesseraError::MissingElement(ref e) if e == "objectManager"));
    }
}
