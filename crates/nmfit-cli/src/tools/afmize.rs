use super::run_captured;
use nmfit::core::io::tsv;
use nmfit::core::image::HeightMap;
use nmfit::engine::collaborators::{CollaboratorError, ImageRenderer};
use nmfit::engine::config::RenderSettings;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

/// AFM image simulation via afmize. Each render writes a per-structure input
/// file next to the structure, runs the simulator in that directory, and
/// reads back the TSV height matrix it produces.
#[derive(Debug, Clone)]
pub struct Afmize {
    path: PathBuf,
}

impl Afmize {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

fn input_document(file_name: &str, stem: &str, settings: &RenderSettings) -> String {
    // afmize's own input format; the stage is aligned and noise disabled so
    // similarity only reflects the conformation.
    format!(
        concat!(
            "file.input           = \"{input}\"\n",
            "file.output.basename = \"{stem}\"\n",
            "file.output.formats  = [\"tsv\", \"svg\"]\n",
            "probe.size           = {{radius = \"{radius}nm\", angle = {angle}}}\n",
            "resolution.x         = \"{res_x}nm\"\n",
            "resolution.y         = \"{res_y}nm\"\n",
            "resolution.z         = \"{res_z}angstrom\"\n",
            "range.x              = [\"-{size_x}nm\", \"{size_x}nm\"]\n",
            "range.y              = [\"-{size_y}nm\", \"{size_y}nm\"]\n",
            "scale_bar.length     = \"0.0nm\"\n",
            "stage.align          = true\n",
            "stage.position       = 0.0\n",
            "noise                = \"0.0nm\"\n",
        ),
        input = file_name,
        stem = stem,
        radius = settings.probe_radius,
        angle = settings.probe_angle,
        res_x = settings.res_x,
        res_y = settings.res_y,
        res_z = settings.res_z,
        size_x = settings.size_x,
        size_y = settings.size_y,
    )
}

impl ImageRenderer for Afmize {
    fn render(
        &self,
        structure: &Path,
        settings: &RenderSettings,
    ) -> Result<HeightMap, CollaboratorError> {
        let parent = structure
            .parent()
            .ok_or_else(|| CollaboratorError::new("afmize", "structure path has no parent"))?;
        let file_name = structure
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| CollaboratorError::new("afmize", "structure path has no file name"))?;
        let stem = structure
            .file_stem()
            .and_then(|n| n.to_str())
            .ok_or_else(|| CollaboratorError::new("afmize", "structure path has no file stem"))?;

        let input_name = format!("{stem}_gen_image.toml");
        fs::write(
            parent.join(&input_name),
            input_document(file_name, stem, settings),
        )
        .map_err(|e| CollaboratorError::new("afmize", format!("failed to write input file: {e}")))?;

        debug!(structure = %structure.display(), "Rendering simulated AFM image.");
        run_captured(
            "afmize",
            Command::new(&self.path).arg(&input_name).current_dir(parent),
        )?;

        tsv::read_height_map_from_path(&parent.join(format!("{stem}.tsv"))).map_err(|e| {
            CollaboratorError::new("afmize", format!("failed to read rendered height map: {e}"))
        })
    }
}
