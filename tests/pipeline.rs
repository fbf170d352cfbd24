//! End-to-end tests for the staged pipeline.
//!
//! These build a small data directory on disk, run every stage with an
//! offline lookup source, and check the artifacts and resumption behaviour.

use std::path::Path;

use semnext_reconcile::config::PipelineConfig;
use semnext_reconcile::error::{ReconcileError, SourceResult, StageError};
use semnext_reconcile::pipeline::{Pipeline, StageKind};
use semnext_reconcile::resolve::cascade::Cascade;
use semnext_reconcile::resolve::{CandidateUri, LookupSource, SourceClass, Symbol};

const SN: &str = "http://semnext.tw.rpi.edu/ontology/semnext#";
const CORTECON: &str = "https://semnext.tw.rpi.edu/id/source/cortecon-neuralsci-org/cortecon/";
const TMP: &str = "https://semnext.tw.rpi.edu/temporary/prefix/";

/// Offline stand-in for the gene-annotation service.
struct FixedMapping;

impl LookupSource for FixedMapping {
    fn name(&self) -> &str {
        "fixed"
    }

    fn resolve(&self, symbol: &Symbol) -> SourceResult<Vec<CandidateUri>> {
        Ok(match symbol.as_str() {
            "BRCA1" => vec![CandidateUri::new(format!("{CORTECON}gene/672"), SourceClass::MappingEntrez)],
            _ => Vec::new(),
        })
    }
}

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

fn seed_data_dir(root: &Path) {
    write(
        root,
        "tabular/Restricted.disease.table.csv",
        ",Entrez_ID,Gene_Symbol,Disease_Ontology_ID,Confidence_Score,Source,Evidence,Type\n\
         0,672,BRCA1,DOID:1612,4.5,TEXTMINING,,textmining\n\
         1,NULL,C9orf72,DOID:332,3.0,KNOWLEDGE,,knowledge\n\
         2,7157,TP53,ICD10:C50,2.0,EXPERIMENTS,,experiments\n",
    );
    write(
        root,
        "tabular/GeneClockData.csv",
        "Entrez_IDs,Gene_Symbol,d0,d7,Cluster\n672,BRCA1,0.1,0.2,3\n",
    );
    write(
        root,
        "tabular/disease_filtered.csv",
        "DISEASE_ID,NAME,ADDRESS\nDOID:1612,breast cancer,http://diseases.jensenlab.org/Entity?id=DOID:1612\n",
    );
    write(
        root,
        "disease.ttl",
        &format!(
            "@prefix tmp: <{TMP}> .\n\
             tmp:BRCA1 a tmp:TemporaryGene .\n\
             tmp:FOOBAR123 a tmp:TemporaryGene .\n"
        ),
    );
    write(
        root,
        "quads/semnext-dump.nq",
        &format!(
            "<http://ex.org/x> <{SN}z-score> \"1.5\" <{CORTECON}gene> .\n\
             <http://ex.org/stale> <http://www.w3.org/2000/01/rdf-schema#label> \"old\" <{CORTECON}disease> .\n\
             <http://ex.org/keep> <http://ex.org/p> \"q\" <http://other.org/g> .\n\
             garbage line\n"
        ),
    );
    write(
        root,
        "output/disease.trig",
        "@prefix ex: <http://ex.org/> .\n\
         <http://other.org/g> { ex:keep ex:p \"q\" . }\n\
         <https://semnext.tw.rpi.edu/id/source/cortecon-neuralsci-org/cortecon/disease> { ex:new ex:p \"r\" . }\n",
    );
}

fn pipeline(root: &Path) -> Pipeline {
    let mut config = PipelineConfig::default();
    config.paths.data_dir = root.to_path_buf();
    Pipeline::new(config)
}

fn offline_cascade() -> Cascade {
    Cascade::new(vec![Box::new(FixedMapping)], 2)
}

fn read(p: &Pipeline, stage: StageKind) -> String {
    std::fs::read_to_string(p.artifacts().artifact(stage)).unwrap()
}

#[test]
fn full_run_produces_every_artifact() {
    let dir = tempfile::TempDir::new().unwrap();
    seed_data_dir(dir.path());
    let p = pipeline(dir.path());

    let runs = p.run_all(&offline_cascade()).unwrap();
    assert_eq!(runs.len(), StageKind::ALL.len());
    assert!(runs.iter().all(|r| !r.skipped));
    assert!(p.artifacts().status().iter().all(|(_, _, produced)| *produced));

    let cleaned = read(&p, StageKind::CleanAssociations);
    assert!(cleaned.contains("C9orf72,C9orf72,DOID:332"));
    assert!(!cleaned.contains("TP53"));

    let intersection = read(&p, StageKind::Intersection);
    assert_eq!(intersection.lines().count(), 2);
    assert!(intersection.contains("672,BRCA1,DOID:1612,breast cancer,"));

    let mapping = read(&p, StageKind::ResolveGenes);
    assert!(mapping.contains(&format!("BRCA1\t{CORTECON}gene/672\tmapping-entrez")));
    assert!(mapping.contains("FOOBAR123\tFOOBAR123\tunresolved"));

    let preserved = read(&p, StageKind::Preserve);
    assert!(preserved.contains("z-score"));
    let cleaned_quads = read(&p, StageKind::Wipe);
    assert!(cleaned_quads.contains("http://ex.org/keep"));
    assert!(!cleaned_quads.contains("stale"));

    let counts = |stage: StageKind| runs.iter().find(|r| r.stage == stage).unwrap().counts;
    assert_eq!(counts(StageKind::ResolveGenes).unresolved, 1);
    assert_eq!(counts(StageKind::ResolveGenes).read, 2);
    assert_eq!(counts(StageKind::Wipe).malformed, 1);
    assert_eq!(counts(StageKind::Wipe).dropped, 1);
    assert_eq!(counts(StageKind::CleanAssociations).dropped, 1);

    let graph = read(&p, StageKind::MergeDerived);
    assert_eq!(graph.matches("<http://ex.org/keep>").count(), 1);
    assert_eq!(graph.matches("<http://ex.org/new>").count(), 1);
    assert_eq!(graph.matches("z-score").count(), 1);
    assert!(!graph.contains("stale"));
}

#[test]
fn rerun_skips_completed_stages() {
    let dir = tempfile::TempDir::new().unwrap();
    seed_data_dir(dir.path());
    let p = pipeline(dir.path());
    p.run_all(&offline_cascade()).unwrap();
    let before = read(&p, StageKind::MergeDerived);

    let runs = p.run_all(&offline_cascade()).unwrap();
    assert!(runs.iter().all(|r| r.skipped));
    assert_eq!(read(&p, StageKind::MergeDerived), before);
}

#[test]
fn repeated_corpus_quad_appears_once_in_final_graph() {
    let dir = tempfile::TempDir::new().unwrap();
    seed_data_dir(dir.path());
    write(
        dir.path(),
        "quads/semnext-dump.nq",
        "<http://ex.org/keep> <http://ex.org/p> \"q\" <http://other.org/g> .\n\
         <http://ex.org/keep>  <http://ex.org/p>   \"q\" <http://other.org/g> .\n\
         <http://ex.org/keep> <http://ex.org/p> \"q\" <http://other.org/g> .\n",
    );
    let p = pipeline(dir.path());

    let runs = p.reconcile().unwrap();
    let graph = read(&p, StageKind::MergeDerived);
    assert_eq!(graph.matches("<http://ex.org/keep>").count(), 1);
    assert_eq!(graph.matches("<http://ex.org/new>").count(), 1);

    let merged = runs.iter().find(|r| r.stage == StageKind::MergeDerived).unwrap();
    assert_eq!(merged.counts.dropped, 2);
}

#[test]
fn removed_artifact_is_rebuilt_alone() {
    let dir = tempfile::TempDir::new().unwrap();
    seed_data_dir(dir.path());
    let p = pipeline(dir.path());
    p.reconcile().unwrap();

    std::fs::remove_file(p.artifacts().artifact(StageKind::MergeDerived)).unwrap();
    let runs = p.reconcile().unwrap();
    let rebuilt: Vec<StageKind> = runs.iter().filter(|r| !r.skipped).map(|r| r.stage).collect();
    assert_eq!(rebuilt, vec![StageKind::MergeDerived]);
}

#[test]
fn missing_derived_dataset_is_fatal_and_leaves_no_artifact() {
    let dir = tempfile::TempDir::new().unwrap();
    seed_data_dir(dir.path());
    std::fs::remove_file(dir.path().join("output/disease.trig")).unwrap();
    let p = pipeline(dir.path());

    let err = p.reconcile().unwrap_err();
    assert!(matches!(
        err,
        ReconcileError::Stage(StageError::MissingArtifact { ref stage, .. }) if stage == "merge-derived"
    ));
    assert!(p.artifacts().is_produced(StageKind::MergeBase));
    assert!(!p.artifacts().is_produced(StageKind::MergeDerived));
    assert!(!dir.path().join("output/semnext-graph.nq.partial").exists());
}

#[test]
fn config_file_drives_paths() {
    let dir = tempfile::TempDir::new().unwrap();
    seed_data_dir(dir.path());
    let config_path = dir.path().join("reconcile.toml");
    std::fs::write(
        &config_path,
        format!(
            "[paths]\ndata_dir = {:?}\noutput_dir = \"artifacts\"\n\n[reconcile]\nmarker = \"\"\n",
            dir.path().display().to_string()
        ),
    )
    .unwrap();

    let config = PipelineConfig::load(&config_path).unwrap();
    let p = Pipeline::new(config);
    p.reconcile().unwrap();
    assert!(dir.path().join("artifacts/semnext-graph.nq").is_file());
}
