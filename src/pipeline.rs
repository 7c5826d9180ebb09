use anyhow::{Context, Result};
use std::fs::File;
use std::io::{self, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::cache::LocationCache;
use crate::config::{Config, SentinelTags};
use crate::exif::{self, ExifDecoder, NomExifDecoder};
use crate::geocode::{NominatimService, Resolver, RetryPolicy};
use crate::jpeg;

/// What happened to a single input file.
///
/// Every file ends in exactly one outcome; none of them stop the batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The photo resolved to this postal code.
    PostalCode(String),
    /// No usable GPS data, or the geocoder could not produce a postal code.
    NoGeocode,
    /// The file does not carry a JPEG signature.
    NotJpeg,
    /// The path does not exist.
    FileNotFound,
    /// Any other I/O or decoding failure (logged with details).
    InternalError,
}

impl Outcome {
    /// Text printed for this outcome: the postal code or a configured sentinel tag.
    pub fn label<'a>(&'a self, tags: &'a SentinelTags) -> &'a str {
        match self {
            Outcome::PostalCode(code) => code,
            Outcome::NoGeocode => &tags.no_geocode,
            Outcome::NotJpeg => &tags.not_jpeg,
            Outcome::FileNotFound => &tags.file_not_found,
            Outcome::InternalError => &tags.internal_error,
        }
    }

    /// Stable machine-readable name, used in JSON output.
    pub fn kind(&self) -> &'static str {
        match self {
            Outcome::PostalCode(_) => "postal_code",
            Outcome::NoGeocode => "no_geocode",
            Outcome::NotJpeg => "not_jpeg",
            Outcome::FileNotFound => "file_not_found",
            Outcome::InternalError => "internal_error",
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, Outcome::PostalCode(_))
    }
}

/// A processed path and its outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileReport {
    pub path: PathBuf,
    pub outcome: Outcome,
}

impl FileReport {
    /// The result line: `"<path>", <result>`.
    pub fn line(&self, tags: &SentinelTags) -> String {
        format!("\"{}\", {}", self.path.display(), self.outcome.label(tags))
    }
}

/// Expand path arguments into the list of files to process.
///
/// - an argument naming an existing file or directory is taken literally,
///   even when it contains glob metacharacters (`IMG[1].jpg`)
/// - otherwise arguments containing `*`, `?` or `[` are glob patterns; a
///   pattern with no match contributes nothing
/// - directories are walked recursively, in file-name order
/// - anything else is kept verbatim, so a missing file is still reported
///
/// # Example
///
/// ```rust,no_run
/// use postcode_locator::pipeline::collect_paths;
///
/// let paths = collect_paths(&["photos/*.jpg".to_string(), "scan.jpeg".to_string()]);
/// println!("{} file(s) to check", paths.len());
/// ```
pub fn collect_paths(specs: &[String]) -> Vec<PathBuf> {
    let mut paths = Vec::new();

    for spec in specs {
        if !is_pattern(spec) || Path::new(spec).exists() {
            push_path(PathBuf::from(spec), &mut paths);
            continue;
        }

        let matches = match glob::glob(spec) {
            Ok(matches) => matches,
            Err(e) => {
                log::warn!("Invalid pattern \"{spec}\": {e}");
                paths.push(PathBuf::from(spec));
                continue;
            }
        };

        let before = paths.len();
        for entry in matches {
            match entry {
                Ok(path) => push_path(path, &mut paths),
                Err(e) => log::warn!("Skipping unreadable match for \"{spec}\": {e}"),
            }
        }
        if paths.len() == before {
            log::warn!("No files match \"{spec}\"");
        }
    }

    paths
}

fn is_pattern(spec: &str) -> bool {
    spec.contains(['*', '?', '['])
}

fn push_path(path: PathBuf, paths: &mut Vec<PathBuf>) {
    if !path.is_dir() {
        paths.push(path);
        return;
    }
    for entry in WalkDir::new(&path)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        if entry.file_type().is_file() {
            paths.push(entry.into_path());
        }
    }
}

/// Drives sniffing, tag decoding, coordinate extraction and resolution for a
/// batch of files, sharing one location cache.
pub struct Locator {
    decoder: Box<dyn ExifDecoder>,
    resolver: Resolver,
    cache: LocationCache,
    precision: u32,
}

impl Locator {
    pub fn new(decoder: Box<dyn ExifDecoder>, resolver: Resolver, cache: LocationCache) -> Self {
        let precision = cache.precision();
        Self {
            decoder,
            resolver,
            cache,
            precision,
        }
    }

    /// Build the default stack from configuration: `nom-exif` decoding,
    /// Nominatim geocoding, and the on-disk cache (or an in-memory one when
    /// `persist_cache` is `false`).
    pub fn from_config(config: &Config, persist_cache: bool) -> Result<Self> {
        let geocoding = &config.geocoding;
        let cache = if persist_cache {
            LocationCache::open(&config.cache.filename, geocoding.precision)
        } else {
            LocationCache::in_memory(geocoding.precision)
        };

        let geocoder = NominatimService::from_config(geocoding)?;
        let resolver = Resolver::new(
            Box::new(geocoder),
            geocoding.user_agent.clone(),
            RetryPolicy::from_config(geocoding),
        );

        Ok(Self::new(Box::new(NomExifDecoder::new()), resolver, cache))
    }

    pub fn cache(&self) -> &LocationCache {
        &self.cache
    }

    /// Process every file named by `specs`, calling `on_report` as each one
    /// finishes, then flush the cache once.
    pub async fn run<F>(&mut self, specs: &[String], mut on_report: F) -> Vec<FileReport>
    where
        F: FnMut(&FileReport),
    {
        let paths = collect_paths(specs);
        let total = paths.len();
        log::info!("Found {total} file(s) to check");

        let mut reports = Vec::with_capacity(total);
        for (i, path) in paths.into_iter().enumerate() {
            log::info!("[{}/{}] Processing: {}", i + 1, total, path.display());

            let outcome = self.process_file(&path).await;
            let report = FileReport { path, outcome };
            on_report(&report);
            reports.push(report);
        }

        self.cache.flush();
        reports
    }

    /// Resolve a single file. Never fails: every fault becomes an [`Outcome`].
    pub async fn process_file(&mut self, path: &Path) -> Outcome {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                log::warn!("File not found: {}", path.display());
                return Outcome::FileNotFound;
            }
            Err(e) => {
                log::error!("Failed to open {}: {e}", path.display());
                return Outcome::InternalError;
            }
        };

        match self.locate(file).await {
            Ok(outcome) => outcome,
            Err(e) => {
                log::error!("Failed to process {}: {e:#}", path.display());
                Outcome::InternalError
            }
        }
    }

    async fn locate(&mut self, mut file: File) -> Result<Outcome> {
        if !jpeg::is_jpeg(&mut file).context("Failed to read file header")? {
            return Ok(Outcome::NotJpeg);
        }

        file.seek(SeekFrom::Start(0))
            .context("Failed to rewind file")?;
        let tags = self.decoder.decode(file).context("Failed to decode EXIF tags")?;
        let gps = exif::gps_tags(tags);

        let coordinate = match exif::extract_coordinate(&gps, self.precision) {
            Ok(coordinate) => coordinate,
            Err(e) => {
                log::warn!("Unusable GPS data: {e}");
                return Ok(Outcome::NoGeocode);
            }
        };
        match &coordinate {
            Some(c) => log::info!("Extracted coordinate {c}"),
            None => log::info!("No GPS coordinate found"),
        }

        match self.resolver.resolve(coordinate.as_ref(), &mut self.cache).await {
            Ok(Some(code)) => Ok(Outcome::PostalCode(code)),
            Ok(None) => Ok(Outcome::NoGeocode),
            Err(e) => {
                log::warn!("{e}");
                Ok(Outcome::NoGeocode)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exif::{
        GPS_LATITUDE, GPS_LATITUDE_REF, GPS_LONGITUDE, GPS_LONGITUDE_REF, Rational, TagMap,
        TagValue,
    };
    use crate::geocode::ReverseGeocoder;
    use std::fs;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tempfile::TempDir;

    // ── fakes ────────────────────────────────────────────────────────

    enum FakeDecoder {
        Tags(TagMap),
        Fail,
    }

    impl ExifDecoder for FakeDecoder {
        fn decode(&self, _file: File) -> Result<TagMap> {
            match self {
                FakeDecoder::Tags(tags) => Ok(tags.clone()),
                FakeDecoder::Fail => anyhow::bail!("corrupt EXIF block"),
            }
        }
    }

    type CallLog = Arc<Mutex<Vec<String>>>;

    struct FakeGeocoder {
        address: Option<String>,
        calls: CallLog,
    }

    #[async_trait::async_trait]
    impl ReverseGeocoder for FakeGeocoder {
        fn name(&self) -> &str {
            "Fake"
        }

        async fn reverse(&self, identity: &str, _query: &str) -> Result<String> {
            self.calls.lock().unwrap().push(identity.to_string());
            match &self.address {
                Some(address) => Ok(address.clone()),
                None => anyhow::bail!("connection refused"),
            }
        }
    }

    fn gps_tag_map() -> TagMap {
        let dms = |d: u32, m: u32, s: u32| {
            TagValue::Rationals(vec![
                Rational::new(d, 1),
                Rational::new(m, 1),
                Rational::new(s, 100),
            ])
        };
        let mut tags = TagMap::new();
        tags.insert("Image Make".into(), TagValue::Text("Apple".into()));
        tags.insert(GPS_LATITUDE.into(), dms(32, 47, 4900));
        tags.insert(GPS_LATITUDE_REF.into(), TagValue::Text("N".into()));
        tags.insert(GPS_LONGITUDE.into(), dms(96, 48, 510));
        tags.insert(GPS_LONGITUDE_REF.into(), TagValue::Text("W".into()));
        tags
    }

    fn locator(decoder: FakeDecoder, address: Option<&str>, cache: LocationCache) -> (Locator, CallLog) {
        let calls = CallLog::default();
        let geocoder = FakeGeocoder {
            address: address.map(str::to_string),
            calls: calls.clone(),
        };
        let policy = RetryPolicy {
            max_attempts: 3,
            backoff_unit: Duration::ZERO,
        };
        let resolver = Resolver::new(Box::new(geocoder), "tester", policy);
        (Locator::new(Box::new(decoder), resolver, cache), calls)
    }

    const ADDRESS: &str = "123 Main St, Springfield, Anystate, 75204, USA";

    fn write_jpeg(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        let mut bytes = vec![0xFF, 0xD8, 0xFF, 0xE1, 0x00, 0x10];
        bytes.extend_from_slice(b"Exif\0");
        bytes.extend_from_slice(&[0u8; 32]);
        fs::write(&path, bytes).unwrap();
        path
    }

    // ── Outcome ──────────────────────────────────────────────────────

    #[test]
    fn outcome_labels_use_sentinels() {
        let tags = Config::default().tags;
        assert_eq!(Outcome::PostalCode("75204".into()).label(&tags), "75204");
        assert_eq!(Outcome::NoGeocode.label(&tags), "no_geocode");
        assert_eq!(Outcome::NotJpeg.label(&tags), "not_jpeg");
        assert_eq!(Outcome::FileNotFound.label(&tags), "file_not_found");
        assert_eq!(Outcome::InternalError.label(&tags), "internal_error");
    }

    #[test]
    fn report_line_format() {
        let tags = Config::default().tags;
        let report = FileReport {
            path: PathBuf::from("photos/a.jpg"),
            outcome: Outcome::PostalCode("75204".into()),
        };
        assert_eq!(report.line(&tags), "\"photos/a.jpg\", 75204");
    }

    // ── collect_paths ────────────────────────────────────────────────

    #[test]
    fn literal_missing_path_is_kept() {
        let paths = collect_paths(&["/nonexistent/photo.jpg".to_string()]);
        assert_eq!(paths, vec![PathBuf::from("/nonexistent/photo.jpg")]);
    }

    #[test]
    fn glob_expands_in_order() {
        let dir = TempDir::new().unwrap();
        for name in ["file2.jpg", "file1.jpg", "other.png"] {
            fs::write(dir.path().join(name), b"x").unwrap();
        }

        let pattern = format!("{}/file*.jpg", dir.path().display());
        let paths = collect_paths(&[pattern]);
        assert_eq!(
            paths,
            vec![dir.path().join("file1.jpg"), dir.path().join("file2.jpg")]
        );
    }

    #[test]
    fn glob_without_matches_is_empty() {
        let dir = TempDir::new().unwrap();
        let pattern = format!("{}/*.jpg", dir.path().display());
        assert!(collect_paths(&[pattern]).is_empty());
    }

    #[test]
    fn existing_bracketed_name_is_literal() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("IMG[1].jpg"), b"x").unwrap();
        fs::write(dir.path().join("IMG1.jpg"), b"x").unwrap();

        let literal = dir.path().join("IMG[1].jpg");
        let paths = collect_paths(&[literal.display().to_string()]);
        assert_eq!(paths, vec![literal]);
    }

    #[test]
    fn bracket_pattern_still_globs_when_not_a_file() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("IMG1.jpg"), b"x").unwrap();

        let pattern = format!("{}/IMG[12].jpg", dir.path().display());
        assert_eq!(collect_paths(&[pattern]), vec![dir.path().join("IMG1.jpg")]);
    }

    #[test]
    fn directory_is_walked_recursively() {
        let dir = TempDir::new().unwrap();
        let sub = dir.path().join("subdir");
        fs::create_dir(&sub).unwrap();
        fs::write(dir.path().join("a.jpg"), b"x").unwrap();
        fs::write(sub.join("b.txt"), b"x").unwrap();

        let paths = collect_paths(&[dir.path().display().to_string()]);
        assert_eq!(paths, vec![dir.path().join("a.jpg"), sub.join("b.txt")]);
    }

    // ── process_file ─────────────────────────────────────────────────

    #[tokio::test]
    async fn missing_file_is_file_not_found() {
        let dir = TempDir::new().unwrap();
        let (mut locator, calls) =
            locator(FakeDecoder::Tags(gps_tag_map()), Some(ADDRESS), LocationCache::in_memory(4));

        let outcome = locator.process_file(&dir.path().join("gone.jpg")).await;
        assert_eq!(outcome, Outcome::FileNotFound);
        assert!(calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn text_file_is_not_jpeg() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("notes.jpg");
        fs::write(&path, "just some text, not a photo").unwrap();
        let (mut locator, _) =
            locator(FakeDecoder::Tags(gps_tag_map()), Some(ADDRESS), LocationCache::in_memory(4));

        assert_eq!(locator.process_file(&path).await, Outcome::NotJpeg);
    }

    #[tokio::test]
    async fn jpeg_without_gps_is_no_geocode() {
        let dir = TempDir::new().unwrap();
        let path = write_jpeg(dir.path(), "plain.jpg");
        let mut tags = TagMap::new();
        tags.insert("Image Make".into(), TagValue::Text("Canon".into()));
        let (mut locator, calls) =
            locator(FakeDecoder::Tags(tags), Some(ADDRESS), LocationCache::in_memory(4));

        assert_eq!(locator.process_file(&path).await, Outcome::NoGeocode);
        assert!(calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn jpeg_with_gps_resolves_postal_code() {
        let dir = TempDir::new().unwrap();
        let path = write_jpeg(dir.path(), "dallas.jpg");
        let (mut locator, calls) =
            locator(FakeDecoder::Tags(gps_tag_map()), Some(ADDRESS), LocationCache::in_memory(4));

        assert_eq!(
            locator.process_file(&path).await,
            Outcome::PostalCode("75204".into())
        );
        assert_eq!(*calls.lock().unwrap(), vec!["tester0"]);
    }

    #[tokio::test]
    async fn decoder_failure_is_internal_error() {
        let dir = TempDir::new().unwrap();
        let path = write_jpeg(dir.path(), "broken.jpg");
        let (mut locator, _) = locator(FakeDecoder::Fail, Some(ADDRESS), LocationCache::in_memory(4));

        assert_eq!(locator.process_file(&path).await, Outcome::InternalError);
    }

    #[tokio::test]
    async fn unreadable_exif_block_is_internal_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("damaged.jpg");
        let mut bytes = vec![0xFF, 0xD8, 0xFF, 0xE1, 0x00, 0x40];
        bytes.extend_from_slice(b"Exif\0\0");
        bytes.extend_from_slice(b"MM\x00\x2A\x00\x00\x00\x08");
        bytes.extend_from_slice(&[0xFF; 4]);
        bytes.extend_from_slice(&[0xAB; 40]);
        fs::write(&path, bytes).unwrap();

        let calls = CallLog::default();
        let geocoder = FakeGeocoder {
            address: Some(ADDRESS.to_string()),
            calls: calls.clone(),
        };
        let resolver = Resolver::new(Box::new(geocoder), "tester", RetryPolicy::default());
        let mut locator = Locator::new(
            Box::new(NomExifDecoder::new()),
            resolver,
            LocationCache::in_memory(4),
        );

        assert_eq!(locator.process_file(&path).await, Outcome::InternalError);
        assert!(calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn exhausted_geocoder_is_no_geocode() {
        let dir = TempDir::new().unwrap();
        let path = write_jpeg(dir.path(), "offline.jpg");
        let (mut locator, calls) =
            locator(FakeDecoder::Tags(gps_tag_map()), None, LocationCache::in_memory(4));

        assert_eq!(locator.process_file(&path).await, Outcome::NoGeocode);
        assert_eq!(*calls.lock().unwrap(), vec!["tester0", "tester1", "tester2"]);
        assert!(locator.cache().is_empty());
    }

    #[tokio::test]
    async fn zero_denominator_is_no_geocode() {
        let dir = TempDir::new().unwrap();
        let path = write_jpeg(dir.path(), "bad_gps.jpg");
        let mut tags = gps_tag_map();
        tags.insert(
            GPS_LATITUDE.into(),
            TagValue::Rationals(vec![Rational::new(32, 0); 3]),
        );
        let (mut locator, calls) =
            locator(FakeDecoder::Tags(tags), Some(ADDRESS), LocationCache::in_memory(4));

        assert_eq!(locator.process_file(&path).await, Outcome::NoGeocode);
        assert!(calls.lock().unwrap().is_empty());
    }

    // ── run ──────────────────────────────────────────────────────────

    #[tokio::test]
    async fn batch_reports_every_file_and_persists_cache() {
        let dir = TempDir::new().unwrap();
        write_jpeg(dir.path(), "file1.jpg");
        write_jpeg(dir.path(), "file2.jpg");
        let text = dir.path().join("file3.jpg");
        fs::write(&text, "not an image").unwrap();
        let missing = dir.path().join("missing.jpg");
        let cache_path = dir.path().join("cache").join("locations.json");

        let specs = vec![
            format!("{}/file*.jpg", dir.path().display()),
            missing.display().to_string(),
        ];

        let (mut locator, calls) = locator(
            FakeDecoder::Tags(gps_tag_map()),
            Some(ADDRESS),
            LocationCache::open(&cache_path, 4),
        );

        let tags = Config::default().tags;
        let mut lines = Vec::new();
        let reports = locator
            .run(&specs, |report| lines.push(report.line(&tags)))
            .await;

        let outcomes: Vec<&Outcome> = reports.iter().map(|r| &r.outcome).collect();
        assert_eq!(
            outcomes,
            vec![
                &Outcome::PostalCode("75204".into()),
                &Outcome::PostalCode("75204".into()),
                &Outcome::NotJpeg,
                &Outcome::FileNotFound,
            ]
        );
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[3], format!("\"{}\", file_not_found", missing.display()));

        // Same coordinate twice: one network call.
        assert_eq!(calls.lock().unwrap().len(), 1);

        let saved = fs::read_to_string(&cache_path).unwrap();
        assert!(saved.contains("\"(32.7969, -96.8014)\""));
        assert!(saved.contains("75204"));
    }

    #[tokio::test]
    async fn second_run_is_served_from_disk_cache() {
        let dir = TempDir::new().unwrap();
        let photo = write_jpeg(dir.path(), "photo.jpg");
        let cache_path = dir.path().join("locations.json");
        let specs = vec![photo.display().to_string()];

        {
            let (mut locator, calls) = locator(
                FakeDecoder::Tags(gps_tag_map()),
                Some(ADDRESS),
                LocationCache::open(&cache_path, 4),
            );
            locator.run(&specs, |_| {}).await;
            assert_eq!(calls.lock().unwrap().len(), 1);
        }

        let (mut locator, calls) = locator(
            FakeDecoder::Tags(gps_tag_map()),
            None,
            LocationCache::open(&cache_path, 4),
        );
        let reports = locator.run(&specs, |_| {}).await;

        assert_eq!(reports[0].outcome, Outcome::PostalCode("75204".into()));
        assert!(calls.lock().unwrap().is_empty());
    }
}
