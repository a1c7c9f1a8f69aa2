use anyhow::{Result, anyhow};
use directories::UserDirs;
use log::info;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Meta {
    pub name: Option<String>,
}

/// Geometry ratios, all relative to palm scale.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClassifierThresholds {
    pub fold_ratio: f32,
    pub extend_ratio: f32,
    pub pinch_ratio: f32,
    pub middle_extend_ratio: f32,
}

impl Default for ClassifierThresholds {
    fn default() -> Self {
        Self {
            fold_ratio: 1.4,
            extend_ratio: 1.7,
            pinch_ratio: 0.5,
            middle_extend_ratio: 1.5,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StabilizerConfig {
    pub smoothing: f32,
    /// A gesture must persist for strictly more than this many ticks.
    pub persistence_ticks: u32,
    pub grace_ticks: u32,
}

impl Default for StabilizerConfig {
    fn default() -> Self {
        Self {
            smoothing: 0.3,
            persistence_ticks: 3,
            grace_ticks: 40,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OrientationConfig {
    pub deadzone: f32,
    pub sensitivity: f32,
    pub fist_level_rate: f32,
    pub compact_level_rate: f32,
}

impl Default for OrientationConfig {
    fn default() -> Self {
        Self {
            deadzone: 0.003,
            sensitivity: 0.8,
            fist_level_rate: 0.1,
            compact_level_rate: 0.05,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FieldConfig {
    pub smoothing: f32,
    pub bob_amplitude: f32,
    pub bob_speed: f32,
    /// Radians per second for the spin-in-place category.
    pub spin_speed: f32,
    /// Radians per second about the view axis for billboards.
    pub billboard_spin: f32,
}

impl Default for FieldConfig {
    fn default() -> Self {
        Self {
            smoothing: 0.08,
            bob_amplitude: 0.05,
            bob_speed: 1.5,
            spin_speed: 1.0,
            billboard_spin: 0.5,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FocusConfig {
    pub cutoff: f32,
    pub smoothing: f32,
    pub idle_scale: f32,
    pub hover_scale: f32,
    pub select_scale: f32,
    /// Distance in front of the observer a selected photo flies to.
    pub select_distance: f32,
    pub hover_bob: f32,
    pub hover_bob_speed: f32,
}

impl Default for FocusConfig {
    fn default() -> Self {
        Self {
            cutoff: 12.0,
            smoothing: 0.15,
            idle_scale: 0.6,
            hover_scale: 1.2,
            select_scale: 2.5,
            select_distance: 6.0,
            hover_bob: 0.1,
            hover_bob_speed: 3.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LayoutConfig {
    pub object_count: usize,
    pub photo_count: usize,
    pub seed: u32,
    pub compact_height: f32,
    pub compact_radius: f32,
    pub expanded_inner: f32,
    pub expanded_outer: f32,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            object_count: 160,
            photo_count: 12,
            seed: 7,
            compact_height: 7.0,
            compact_radius: 3.5,
            expanded_inner: 6.0,
            expanded_outer: 10.0,
        }
    }
}

/// Acquisition-side knobs. The confidence thresholds are handed to the
/// landmark backend untouched; the core never reads them.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    pub min_interval_ms: u64,
    pub retry_ms: u64,
    pub min_detection_confidence: f32,
    pub min_tracking_confidence: f32,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            min_interval_ms: 30,
            retry_ms: 1000,
            min_detection_confidence: 0.5,
            min_tracking_confidence: 0.5,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObserverConfig {
    pub position: [f32; 3],
    pub look_at: [f32; 3],
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            position: [0.0, 0.0, 14.0],
            look_at: [0.0, 0.0, 0.0],
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub tick_ms: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self { tick_ms: 16 }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Profile {
    pub meta: Meta,
    pub classifier: ClassifierThresholds,
    pub stabilizer: StabilizerConfig,
    pub orientation: OrientationConfig,
    pub field: FieldConfig,
    pub focus: FocusConfig,
    pub layout: LayoutConfig,
    pub acquisition: AcquisitionConfig,
    pub observer: ObserverConfig,
    pub runtime: RuntimeConfig,
}

impl Profile {
    pub fn from_toml(txt: &str) -> Result<Self> {
        let profile: Profile = toml::from_str(txt).map_err(|e| anyhow!("invalid profile: {e}"))?;
        validate_profile(&profile)?;
        Ok(profile)
    }
}

#[derive(Debug, Clone)]
pub struct ProfileStore {
    pub active_name: String,
    pub profile: Profile,
    pub config_dir: PathBuf,
    pub profiles_dir: PathBuf,
    pub active_ptr: PathBuf,
}

pub fn config_dir() -> Result<PathBuf> {
    let dirs = UserDirs::new().ok_or_else(|| anyhow!("cannot resolve home directory"))?;
    Ok(dirs.home_dir().join(".config").join("handfield"))
}

fn default_profile_text() -> &'static str {
    include_str!("../profiles/default.toml")
}

impl ProfileStore {
    pub fn load_or_install_default() -> Result<Self> {
        Self::open_at(config_dir()?)
    }

    /// Open (and seed if needed) a profile store rooted at `cfgdir`.
    pub fn open_at(cfgdir: PathBuf) -> Result<Self> {
        let profdir = cfgdir.join("profiles");
        fs::create_dir_all(&profdir)?;

        let def_path = profdir.join("default.toml");
        if !def_path.exists() {
            fs::write(&def_path, default_profile_text())?;
            info!("installed default profile at {}", def_path.display());
        }

        let active_ptr = cfgdir.join("active");
        if !active_ptr.exists() {
            let mut f = fs::File::create(&active_ptr)?;
            f.write_all(b"default")?;
        }

        let active_name = fs::read_to_string(&active_ptr)?.trim().to_string();
        let profile = load_profile(&profdir, &active_name)?;

        Ok(Self {
            active_name,
            profile,
            config_dir: cfgdir,
            profiles_dir: profdir,
            active_ptr,
        })
    }

    /// Re-read the active profile. On error the previous profile stays in place.
    pub fn reload(&mut self) -> Result<()> {
        self.profile = load_profile(&self.profiles_dir, &self.active_name)?;
        Ok(())
    }

    pub fn set_active(&mut self, name: &str) -> Result<()> {
        let p = self.profiles_dir.join(format!("{name}.toml"));
        if !p.exists() {
            return Err(anyhow!("profile not found: {}", p.display()));
        }
        let profile = load_profile(&self.profiles_dir, name)?;
        fs::write(&self.active_ptr, name.as_bytes())?;
        self.active_name = name.to_string();
        self.profile = profile;
        Ok(())
    }

    pub fn list_profiles(&self) -> Vec<String> {
        let mut v = Vec::new();
        if let Ok(rd) = fs::read_dir(&self.profiles_dir) {
            for e in rd.flatten() {
                let path = e.path();
                if path.extension().is_some_and(|ext| ext == "toml") {
                    if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                        v.push(stem.to_string());
                    }
                }
            }
        }
        v.sort();
        v
    }
}

fn load_profile(dir: &Path, name: &str) -> Result<Profile> {
    let path = dir.join(format!("{name}.toml"));
    let txt = fs::read_to_string(&path)
        .map_err(|e| anyhow!("failed to read {}: {e}", path.display()))?;
    Profile::from_toml(&txt).map_err(|e| anyhow!("{}: {e}", path.display()))
}

fn unit_rate(name: &str, v: f32) -> Result<()> {
    if !(v > 0.0 && v <= 1.0) {
        return Err(anyhow!("{name} must be in (0,1], got {v}"));
    }
    Ok(())
}

fn positive(name: &str, v: f32) -> Result<()> {
    if !(v > 0.0) {
        return Err(anyhow!("{name} must be positive, got {v}"));
    }
    Ok(())
}

pub fn validate_profile(p: &Profile) -> Result<()> {
    let c = &p.classifier;
    positive("classifier.fold_ratio", c.fold_ratio)?;
    positive("classifier.pinch_ratio", c.pinch_ratio)?;
    positive("classifier.middle_extend_ratio", c.middle_extend_ratio)?;
    if c.fold_ratio >= c.extend_ratio {
        return Err(anyhow!(
            "classifier.fold_ratio ({}) must be below extend_ratio ({})",
            c.fold_ratio,
            c.extend_ratio
        ));
    }

    unit_rate("stabilizer.smoothing", p.stabilizer.smoothing)?;
    if p.stabilizer.grace_ticks == 0 {
        return Err(anyhow!("stabilizer.grace_ticks must be positive"));
    }

    let o = &p.orientation;
    if o.deadzone < 0.0 {
        return Err(anyhow!("orientation.deadzone must not be negative"));
    }
    positive("orientation.sensitivity", o.sensitivity)?;
    unit_rate("orientation.fist_level_rate", o.fist_level_rate)?;
    unit_rate("orientation.compact_level_rate", o.compact_level_rate)?;

    unit_rate("field.smoothing", p.field.smoothing)?;
    unit_rate("focus.smoothing", p.focus.smoothing)?;
    positive("focus.cutoff", p.focus.cutoff)?;

    let l = &p.layout;
    if l.photo_count > l.object_count {
        return Err(anyhow!(
            "layout.photo_count ({}) exceeds object_count ({})",
            l.photo_count,
            l.object_count
        ));
    }
    if l.expanded_inner > l.expanded_outer {
        return Err(anyhow!("layout.expanded_inner must not exceed expanded_outer"));
    }

    for (name, v) in [
        ("acquisition.min_detection_confidence", p.acquisition.min_detection_confidence),
        ("acquisition.min_tracking_confidence", p.acquisition.min_tracking_confidence),
    ] {
        if !(0.0..=1.0).contains(&v) {
            return Err(anyhow!("{name} must be in [0,1], got {v}"));
        }
    }

    if p.observer.position == p.observer.look_at {
        return Err(anyhow!("observer.position and observer.look_at must differ"));
    }
    if p.runtime.tick_ms == 0 {
        return Err(anyhow!("runtime.tick_ms must be positive"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_default_profile_matches_defaults() {
        let p = Profile::from_toml(default_profile_text()).unwrap();
        let d = Profile::default();
        assert_eq!(p.stabilizer.grace_ticks, d.stabilizer.grace_ticks);
        assert_eq!(p.stabilizer.persistence_ticks, 3);
        assert_eq!(p.acquisition.min_interval_ms, 30);
        assert_eq!(p.focus.cutoff, 12.0);
        assert_eq!(p.classifier.extend_ratio, 1.7);
    }

    #[test]
    fn partial_profile_fills_defaults() {
        let p = Profile::from_toml("[focus]\ncutoff = 9.5\n").unwrap();
        assert_eq!(p.focus.cutoff, 9.5);
        assert_eq!(p.field.smoothing, 0.08);
        assert_eq!(p.orientation.sensitivity, 0.8);
    }

    #[test]
    fn rejects_inverted_ratios() {
        let err = Profile::from_toml("[classifier]\nfold_ratio = 2.0\n").unwrap_err();
        assert!(err.to_string().contains("fold_ratio"));
    }

    #[test]
    fn rejects_out_of_range_smoothing() {
        assert!(Profile::from_toml("[stabilizer]\nsmoothing = 1.5\n").is_err());
        assert!(Profile::from_toml("[field]\nsmoothing = 0.0\n").is_err());
    }

    #[test]
    fn store_installs_default_and_switches() {
        let dir = std::env::temp_dir().join(format!("handfield-store-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);

        let mut store = ProfileStore::open_at(dir.clone()).unwrap();
        assert_eq!(store.active_name, "default");
        assert_eq!(store.list_profiles(), vec!["default".to_string()]);

        fs::write(
            store.profiles_dir.join("wide.toml"),
            "[meta]\nname = \"wide\"\n[focus]\ncutoff = 20.0\n",
        )
        .unwrap();
        store.set_active("wide").unwrap();
        assert_eq!(store.profile.focus.cutoff, 20.0);
        assert_eq!(fs::read_to_string(&store.active_ptr).unwrap(), "wide");

        assert!(store.set_active("missing").is_err());
        assert_eq!(store.active_name, "wide");

        fs::write(store.profiles_dir.join("wide.toml"), "[focus]\ncutoff = -1.0\n").unwrap();
        assert!(store.reload().is_err());
        assert_eq!(store.profile.focus.cutoff, 20.0);

        let _ = fs::remove_dir_all(&dir);
    }
}
