#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::process::Command;

use bio::io::fastq;
use krakenpipe::subsample::write_records;

const FAKE_KRAKEN2: &str = r#"#!/bin/sh
report=""
output=""
while [ $# -gt 0 ]; do
    case "$1" in
        --report) report="$2"; shift 2 ;;
        --output) output="$2"; shift 2 ;;
        *) shift ;;
    esac
done
echo "call" >> "$(dirname "$0")/kraken2.calls"
echo "100.00	2	0	R	1	root" > "$report"
echo "C	read0	562	10	562:6" > "$output"
"#;

const FAKE_TRANSLATE: &str = r#"#!/bin/sh
[ -d "$1" ] || exit 4
echo "read0	root;Bacteria;Proteobacteria;Escherichia coli" > "$3"
"#;

const FAKE_TO_KRONA: &str = r#"#!/bin/sh
[ -s "$1" ] || exit 5
echo "1	Bacteria	Proteobacteria	Escherichia coli"
"#;

const FAKE_KTIMPORTTEXT: &str = r#"#!/bin/sh
out=""
while [ $# -gt 0 ]; do
    case "$1" in
        -o) out="$2"; shift 2 ;;
        *) shift ;;
    esac
done
echo "<html>kronagram</html>" > "$out"
"#;

fn script(path: &Path, body: &str) {
    fs::write(path, body).unwrap();
    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
}

fn reads(path: &Path, mate: u8, n: usize) {
    let records: Vec<fastq::Record> = (0..n)
        .map(|i| fastq::Record::with_attrs(&format!("read{}/{}", i, mate), None, b"ACGTACGTAC", b"IIIIIIIIII"))
        .collect();
    write_records(path, &records).unwrap();
}

#[test]
fn test_full_run_with_stand_in_tools() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    let bin = root.join("bin");
    let scripts = root.join("scripts");
    let db = root.join("db");
    for d in [&bin, &scripts, &db] {
        fs::create_dir(d).unwrap();
    }

    script(&bin.join("kraken2"), FAKE_KRAKEN2);
    script(&bin.join("ktImportText"), FAKE_KTIMPORTTEXT);
    script(&scripts.join("translate_kraken2"), FAKE_TRANSLATE);
    script(&scripts.join("kraken2_to_krona"), FAKE_TO_KRONA);

    let config = root.join("krakenpipe.conf");
    fs::write(
        &config,
        format!(
            "# test setup\nexport KRAKEN2_DB={}\nSCRIPTS_DIR=scripts\nKRAKEN2={}\nKTIMPORTTEXT=\"{}\"\n",
            db.display(),
            bin.join("kraken2").display(),
            bin.join("ktImportText").display()
        ),
    )
    .unwrap();

    reads(&root.join("gut_1.fastq.gz"), 1, 30);
    reads(&root.join("gut_2.fastq.gz"), 2, 30);
    fs::write(root.join("contigs.fasta"), ">c1\nACGT\n").unwrap();
    fs::write(root.join("readme.txt"), "ignored").unwrap();

    let out = root.join("out");
    let run = || {
        Command::new(env!("CARGO_BIN_EXE_krakenpipe"))
            .current_dir(root)
            .args(["-c", "krakenpipe.conf", "-o", "out", "-t", "2", "-s", "10", "--seed", "1"])
            .args(["gut_1.fastq.gz", "gut_2.fastq.gz", "contigs.fasta", "readme.txt"])
            .output()
            .expect("Failed to execute command")
    };

    let first = run();
    assert!(
        first.status.success(),
        "stdout: {}\nstderr: {}",
        String::from_utf8_lossy(&first.stdout),
        String::from_utf8_lossy(&first.stderr)
    );

    for sample in ["gut", "contigs"] {
        for ext in ["kreport", "krak2", "kraken2", "krona"] {
            let path = out.join(format!("{}.{}", sample, ext));
            assert!(fs::metadata(&path).map(|m| m.len() > 0).unwrap_or(false), "{}", path.display());
        }
    }
    assert!(fs::metadata(out.join("kronagram.html")).unwrap().len() > 0);
    assert!(out.join("run_summary.json").exists());
    assert!(!out.join("gut.sub.1.fq.gz").exists());
    assert!(!out.join("gut.sub.2.fq.gz").exists());

    let second = run();
    assert!(second.status.success());
    let calls = fs::read_to_string(bin.join("kraken2.calls")).unwrap();
    assert_eq!(calls.lines().count(), 2, "the rerun must not classify again");
}
