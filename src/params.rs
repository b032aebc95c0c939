// ==============================================================================
// params.rs — VEHICLE PARAMETER FILES
// ==============================================================================
// Layout under a parameter root:
//
//   <root>/vehicle/parameters_vehicle<id>.yaml   body, masses, inertias,
//                                                steering / longitudinal /
//                                                trailer sections
//   <root>/tire/parameters_tire.yaml             Magic Formula coefficients,
//                                                flat or under a `tire:` key
//
// Every key is optional; a missing key keeps its default (0). Unknown keys are
// ignored. A section that is not a mapping is skipped. A missing file is an
// error.
// ==============================================================================

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::dynamics::final_accel::FinalAccelConfig;
use crate::dynamics::tire::TireParameters;
use crate::error::ParamsError;
use crate::mpcc::config::MpccConfig;
use crate::vehicle::{SteeringBounds, VehicleGeometry};

/// Parameter root used when none is given.
pub const DEFAULT_PARAMS_DIR: &str = "parameters";

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SteeringParameters {
    pub min: f64,               // rad
    pub max: f64,               // rad
    pub v_min: f64,             // rad/s
    pub v_max: f64,             // rad/s
    pub kappa_dot_max: f64,     // 1/(m*s)
    pub kappa_dot_dot_max: f64, // 1/(m*s^2)
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LongitudinalParameters {
    pub v_min: f64,     // m/s
    pub v_max: f64,     // m/s
    pub v_switch: f64,  // m/s
    pub a_max: f64,     // m/s^2
    pub j_max: f64,     // m/s^3
    pub j_dot_max: f64, // m/s^4
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TrailerParameters {
    pub l: f64,
    pub w: f64,
    pub l_hitch: f64,
    pub l_total: f64,
    pub l_wb: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VehicleParameters {
    // --- body ---
    pub l: f64, // length, m
    pub w: f64, // width, m

    pub steering: SteeringParameters,
    pub longitudinal: LongitudinalParameters,

    // --- masses, kg ---
    pub m: f64,
    pub m_s: f64,
    pub m_uf: f64,
    pub m_ur: f64,

    // --- axle distances from CoG, m ---
    pub a: f64,
    pub b: f64,

    // --- sprung mass inertias, kg*m^2 ---
    #[serde(rename = "I_Phi_s")]
    pub i_phi_s: f64,
    #[serde(rename = "I_y_s")]
    pub i_y_s: f64,
    #[serde(rename = "I_z")]
    pub i_z: f64,
    #[serde(rename = "I_xz_s")]
    pub i_xz_s: f64,

    // --- suspension ---
    #[serde(rename = "K_sf")]
    pub k_sf: f64,
    #[serde(rename = "K_sdf")]
    pub k_sdf: f64,
    #[serde(rename = "K_sr")]
    pub k_sr: f64,
    #[serde(rename = "K_sdr")]
    pub k_sdr: f64,

    // --- geometry ---
    #[serde(rename = "T_f")]
    pub t_f: f64,
    #[serde(rename = "T_r")]
    pub t_r: f64,
    #[serde(rename = "K_ras")]
    pub k_ras: f64,
    #[serde(rename = "K_tsf")]
    pub k_tsf: f64,
    #[serde(rename = "K_tsr")]
    pub k_tsr: f64,
    #[serde(rename = "K_rad")]
    pub k_rad: f64,
    #[serde(rename = "K_zt")]
    pub k_zt: f64,

    pub h_cg: f64,
    pub h_raf: f64,
    pub h_rar: f64,
    pub h_s: f64,

    #[serde(rename = "I_uf")]
    pub i_uf: f64,
    #[serde(rename = "I_ur")]
    pub i_ur: f64,
    #[serde(rename = "I_y_w")]
    pub i_y_w: f64,

    #[serde(rename = "K_lt")]
    pub k_lt: f64,
    #[serde(rename = "R_w")]
    pub r_w: f64, // effective wheel radius, m

    // --- torque split, front share ---
    #[serde(rename = "T_sb")]
    pub t_sb: f64,
    #[serde(rename = "T_se")]
    pub t_se: f64,

    // --- camber ---
    #[serde(rename = "D_f")]
    pub d_f: f64,
    #[serde(rename = "D_r")]
    pub d_r: f64,
    #[serde(rename = "E_f")]
    pub e_f: f64,
    #[serde(rename = "E_r")]
    pub e_r: f64,

    // only ever read from the tire file
    #[serde(skip_deserializing)]
    pub tire: TireParameters,

    pub trailer: TrailerParameters,
}

impl VehicleParameters {
    pub fn wheelbase(&self) -> f64 {
        self.a + self.b
    }

    /// Prediction geometry with the reference point at the CoG.
    pub fn geometry(&self) -> VehicleGeometry {
        VehicleGeometry { wheelbase: self.wheelbase(), rear_axle_offset: Some(self.b) }
    }

    pub fn steering_bounds(&self) -> SteeringBounds {
        SteeringBounds { min: self.steering.min, max: self.steering.max }
    }

    /// `base` with this vehicle's mass and wheel radius.
    pub fn final_accel_config(&self, base: FinalAccelConfig) -> FinalAccelConfig {
        let mut cfg = base;
        cfg.mass = self.m;
        cfg.wheel_radius = self.r_w;
        cfg.powertrain.wheel_radius = self.r_w;
        cfg
    }

    /// `base` with this vehicle's geometry and steering limits.
    pub fn mpcc_config(&self, base: MpccConfig) -> MpccConfig {
        let mut cfg = base;
        cfg.vehicle = Some(self.geometry());
        cfg.bounds.steering = Some(self.steering_bounds());
        cfg.bounds.steering_rate = self.steering.v_max;
        cfg
    }
}

fn read_yaml(path: &Path) -> Result<serde_yaml::Value, ParamsError> {
    if !path.exists() {
        return Err(ParamsError::NotFound(path.to_path_buf()));
    }
    let text = fs::read_to_string(path).map_err(|source| ParamsError::Io { path: path.to_path_buf(), source })?;
    serde_yaml::from_str(&text).map_err(|source| ParamsError::Yaml { path: path.to_path_buf(), source })
}

// an empty document keeps every default
fn from_node<T: DeserializeOwned + Default>(node: serde_yaml::Value, path: &Path) -> Result<T, ParamsError> {
    if node.is_null() {
        return Ok(T::default());
    }
    serde_yaml::from_value(node).map_err(|source| ParamsError::Yaml { path: path.to_path_buf(), source })
}

const VEHICLE_SECTIONS: [&str; 3] = ["steering", "longitudinal", "trailer"];

fn drop_malformed_sections(node: &mut serde_yaml::Value, path: &Path) {
    let Some(map) = node.as_mapping_mut() else {
        return;
    };
    for key in VEHICLE_SECTIONS {
        if map.get(key).is_some_and(|section| !section.is_mapping()) {
            debug!(section = key, path = %path.display(), "skipping section that is not a mapping");
            map.remove(key);
        }
    }
}

pub fn vehicle_file(vehicle_id: u32, dir: &Path) -> PathBuf {
    dir.join("vehicle").join(format!("parameters_vehicle{vehicle_id}.yaml"))
}

pub fn tire_file(dir: &Path) -> PathBuf {
    dir.join("tire").join("parameters_tire.yaml")
}

/// Load the parameters of `vehicle_id` from the parameter root `dir`.
pub fn setup_vehicle_parameters(vehicle_id: u32, dir: impl AsRef<Path>) -> Result<VehicleParameters, ParamsError> {
    let dir = dir.as_ref();
    let vehicle_path = vehicle_file(vehicle_id, dir);
    let tire_path = tire_file(dir);

    let mut vehicle_node = read_yaml(&vehicle_path)?;
    let tire_root = read_yaml(&tire_path)?;

    drop_malformed_sections(&mut vehicle_node, &vehicle_path);
    let mut params: VehicleParameters = from_node(vehicle_node, &vehicle_path)?;

    let tire_node = match tire_root.get("tire") {
        Some(nested) if nested.is_mapping() => nested.clone(),
        _ => tire_root,
    };
    params.tire = from_node(tire_node, &tire_path)?;

    info!(vehicle_id, path = %vehicle_path.display(), "vehicle parameters loaded");
    Ok(params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dynamics::tire::REFERENCE_TIRE;
    use crate::vehicle::COMPACT_EV;
    use approx::assert_relative_eq;

    fn shipped() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join(DEFAULT_PARAMS_DIR)
    }

    // scratch parameter root with the given files
    fn scratch(files: &[(&str, &str)]) -> PathBuf {
        let root = std::env::temp_dir().join(format!("vehicle-params-{}", uuid::Uuid::new_v4()));
        for (rel, body) in files {
            let path = root.join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, body).unwrap();
        }
        root
    }

    #[test]
    fn loads_shipped_vehicle_one() {
        let p = setup_vehicle_parameters(1, shipped()).unwrap();
        assert_relative_eq!(p.l, 4.298, max_relative = 1e-12);
        assert_relative_eq!(p.m, 1225.887, max_relative = 1e-12);
        assert_relative_eq!(p.i_z, 1538.853, max_relative = 1e-12);
        assert_relative_eq!(p.r_w, 0.344, max_relative = 1e-12);
        assert_relative_eq!(p.steering.max, 0.910, max_relative = 1e-12);
        assert_relative_eq!(p.longitudinal.v_switch, 4.755, max_relative = 1e-12);
        assert_eq!(p.tire, REFERENCE_TIRE);
    }

    #[test]
    fn partial_vehicle_file_keeps_defaults() {
        let p = setup_vehicle_parameters(2, shipped()).unwrap();
        assert_relative_eq!(p.wheelbase(), 1.156 + 1.422, max_relative = 1e-12);
        assert_eq!(p.k_sf, 0.0);
        assert_eq!(p.trailer, TrailerParameters::default());
    }

    #[test]
    fn loads_shipped_van_without_trailer() {
        let p = setup_vehicle_parameters(3, shipped()).unwrap();
        assert_relative_eq!(p.wheelbase(), 1.2016 + 1.2596, max_relative = 1e-12);
        assert_relative_eq!(p.steering.max, 1.023, max_relative = 1e-12);
        assert_eq!(p.trailer, TrailerParameters::default());
    }

    #[test]
    fn loads_shipped_truck_with_trailer() {
        let p = setup_vehicle_parameters(4, shipped()).unwrap();
        assert_relative_eq!(p.trailer.l_wb, 8.1, max_relative = 1e-12);
        assert_relative_eq!(p.trailer.l_hitch, 12.0, max_relative = 1e-12);
        assert_relative_eq!(p.trailer.l_total, 16.5, max_relative = 1e-12);
        assert_relative_eq!(p.m, 8800.0, max_relative = 1e-12);

        let mpcc = p.mpcc_config(MpccConfig::default());
        assert!(mpcc.validate().is_ok());
        assert_eq!(mpcc.bounds.steering_rate, 0.7);
    }

    #[test]
    fn flat_tire_file_is_accepted() {
        let root = scratch(&[
            ("vehicle/parameters_vehicle7.yaml", "m: 900.0\n"),
            ("tire/parameters_tire.yaml", "p_cx1: 1.5\np_dy1: 0.9\n"),
        ]);
        let p = setup_vehicle_parameters(7, &root).unwrap();
        assert_eq!(p.m, 900.0);
        assert_eq!(p.tire.p_cx1, 1.5);
        assert_eq!(p.tire.p_dy1, 0.9);
        assert_eq!(p.tire.r_vy6, 0.0);
        fs::remove_dir_all(root).ok();
    }

    #[test]
    fn empty_files_yield_defaults() {
        let root = scratch(&[
            ("vehicle/parameters_vehicle3.yaml", ""),
            ("tire/parameters_tire.yaml", ""),
        ]);
        let p = setup_vehicle_parameters(3, &root).unwrap();
        assert_eq!(p, VehicleParameters::default());
        fs::remove_dir_all(root).ok();
    }

    #[test]
    fn missing_files_are_reported_by_path() {
        let root = scratch(&[("tire/parameters_tire.yaml", "tire: {}\n")]);
        match setup_vehicle_parameters(9, &root) {
            Err(ParamsError::NotFound(path)) => assert_eq!(path, vehicle_file(9, &root)),
            other => panic!("unexpected {other:?}"),
        }

        let root2 = scratch(&[("vehicle/parameters_vehicle1.yaml", "m: 1.0\n")]);
        match setup_vehicle_parameters(1, &root2) {
            Err(ParamsError::NotFound(path)) => assert_eq!(path, tire_file(&root2)),
            other => panic!("unexpected {other:?}"),
        }
        fs::remove_dir_all(root).ok();
        fs::remove_dir_all(root2).ok();
    }

    #[test]
    fn non_mapping_sections_are_skipped() {
        let root = scratch(&[
            (
                "vehicle/parameters_vehicle5.yaml",
                "m: 900.0\nlongitudinal: none\nsteering: 3\ntrailer: [1.0, 2.0]\n",
            ),
            ("tire/parameters_tire.yaml", "{}\n"),
        ]);
        let p = setup_vehicle_parameters(5, &root).unwrap();
        assert_eq!(p.m, 900.0);
        assert_eq!(p.longitudinal, LongitudinalParameters::default());
        assert_eq!(p.steering, SteeringParameters::default());
        assert_eq!(p.trailer, TrailerParameters::default());
        fs::remove_dir_all(root).ok();
    }

    #[test]
    fn malformed_yaml_is_a_parse_error() {
        let root = scratch(&[
            ("vehicle/parameters_vehicle1.yaml", "m: [unclosed\n"),
            ("tire/parameters_tire.yaml", "{}\n"),
        ]);
        assert!(matches!(setup_vehicle_parameters(1, &root), Err(ParamsError::Yaml { .. })));
        fs::remove_dir_all(root).ok();
    }

    #[test]
    fn derived_configs_follow_the_vehicle() {
        let p = setup_vehicle_parameters(1, shipped()).unwrap();

        let geometry = p.geometry();
        assert_relative_eq!(geometry.wheelbase, 0.88392 + 1.50876, max_relative = 1e-12);
        assert_eq!(geometry.rear_axle_offset, Some(1.50876));

        let mpcc = p.mpcc_config(MpccConfig::default());
        assert!(mpcc.validate().is_ok());
        assert_eq!(mpcc.bounds.steering, Some(SteeringBounds { min: -0.910, max: 0.910 }));
        assert_eq!(mpcc.bounds.steering_rate, 0.4);

        let accel = p.final_accel_config(COMPACT_EV);
        assert_eq!(accel.mass, p.m);
        assert_eq!(accel.powertrain.wheel_radius, p.r_w);
    }
}
