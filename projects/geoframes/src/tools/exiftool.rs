use super::{run_tool, CancelSignal, GeotagFields, MetadataTool, TagMap, ToolError};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;

/// Embedded documents, group-3 names, short tag names, files over 2 GB.
const READ_ARGS: &[&str] = &["-j", "-ee", "-G3", "-s", "-api", "largefilesupport=1"];

/// Metadata tool backed by the `exiftool` binary, one process per call.
pub struct ExifTool {
    program: PathBuf,
    timeout: Option<Duration>,
    cancel: CancelSignal,
}

impl ExifTool {
    pub fn new(program: impl Into<PathBuf>, timeout: Option<Duration>, cancel: CancelSignal) -> Self {
        Self {
            program: program.into(),
            timeout,
            cancel,
        }
    }

    fn name(&self) -> String {
        self.program.display().to_string()
    }
}

impl MetadataTool for ExifTool {
    async fn read_tags(&self, video: &Path) -> Result<TagMap, ToolError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(READ_ARGS).arg(video);

        let output = run_tool(cmd, &self.name(), self.timeout, &self.cancel).await?;
        parse_json_output(&self.name(), &output.stdout)
    }

    async fn write_tags(&self, image: &Path, fields: &GeotagFields) -> Result<(), ToolError> {
        let mut cmd = Command::new(&self.program);
        cmd.arg("-overwrite_original")
            .args(write_args(fields))
            .arg(image);

        run_tool(cmd, &self.name(), self.timeout, &self.cancel).await?;
        Ok(())
    }
}

/// exiftool's `-j` output is an array with one object per input file.
fn parse_json_output(program: &str, stdout: &[u8]) -> Result<TagMap, ToolError> {
    let files: Vec<TagMap> = serde_json::from_slice(stdout).map_err(|e| ToolError::Output {
        program: program.to_string(),
        reason: e.to_string(),
    })?;

    files.into_iter().next().ok_or_else(|| ToolError::Output {
        program: program.to_string(),
        reason: "no file entry in output".to_string(),
    })
}

/// Assignment arguments for a single frame.
///
/// Reference tags are derived from the sign of each value.
pub fn write_args(fields: &GeotagFields) -> Vec<String> {
    let lat_ref = if fields.latitude < 0.0 { "S" } else { "N" };
    let lon_ref = if fields.longitude < 0.0 { "W" } else { "E" };
    let alt_ref = if fields.altitude < 0.0 { 1 } else { 0 };

    let mut args = vec![
        format!("-AllDates={}", fields.all_dates),
        format!("-GPSTimeStamp={}", fields.gps_time_stamp),
        format!("-GPSDateStamp={}", fields.gps_date_stamp),
        format!("-GPSLatitude={}", fields.latitude.abs()),
        format!("-GPSLatitudeRef={}", lat_ref),
        format!("-GPSLongitude={}", fields.longitude.abs()),
        format!("-GPSLongitudeRef={}", lon_ref),
        format!("-GPSAltitude={}", fields.altitude.abs()),
        format!("-GPSAltitudeRef#={}", alt_ref),
    ];
    if let Some(projection) = &fields.projection_type {
        args.push(format!("-ProjectionType={}", projection));
    }
    if let Some(make) = &fields.make {
        args.push(format!("-Make={}", make));
    }
    args
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields() -> GeotagFields {
        GeotagFields {
            all_dates: "2021-06-01T10:00:03".into(),
            gps_time_stamp: "10:00:03".into(),
            gps_date_stamp: "2021-06-01".into(),
            latitude: -33.5,
            longitude: 151.25,
            altitude: 12.0,
            projection_type: Some("equirectangular".into()),
            make: None,
        }
    }

    #[test]
    fn test_write_args_carry_every_field() {
        let args = write_args(&fields());
        assert!(args.contains(&"-AllDates=2021-06-01T10:00:03".to_string()));
        assert!(args.contains(&"-GPSTimeStamp=10:00:03".to_string()));
        assert!(args.contains(&"-GPSDateStamp=2021-06-01".to_string()));
        assert!(args.contains(&"-GPSLatitude=33.5".to_string()));
        assert!(args.contains(&"-GPSLatitudeRef=S".to_string()));
        assert!(args.contains(&"-GPSLongitudeRef=E".to_string()));
        assert!(args.contains(&"-GPSAltitudeRef#=0".to_string()));
        assert!(args.contains(&"-ProjectionType=equirectangular".to_string()));
        assert!(!args.iter().any(|a| a.starts_with("-Make=")));
    }

    #[test]
    fn test_parse_json_output_takes_first_file() {
        let stdout = br#"[{"SourceFile":"a.mp4","Main:Duration":12.5,"Doc1:GPSLatitude":"1 deg 0' 0.00\" N"}]"#;
        let tags = parse_json_output("exiftool", stdout).unwrap();
        assert_eq!(tags["Main:Duration"], serde_json::json!(12.5));
        assert!(tags.contains_key("Doc1:GPSLatitude"));
    }

    #[test]
    fn test_parse_json_output_rejects_garbage() {
        assert!(matches!(
            parse_json_output("exiftool", b"Error: File not found"),
            Err(ToolError::Output { .. })
        ));
        assert!(matches!(
            parse_json_output("exiftool", b"[]"),
            Err(ToolError::Output { .. })
        ));
    }
}
