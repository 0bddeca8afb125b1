use anyhow::Result;
use course_generator::{AuditReport, ContentStore, JsonFileRecordStore, config::StorageConfig};
use std::env;
use std::sync::Arc;

fn print_report(report: &AuditReport) {
    println!("\n=== Audit: {} ===", report.course);
    println!("Modules: {}", report.modules);
    println!("Submodules: {}", report.submodules);
    println!("Lessons: {}", report.lessons);
    println!("  expanded: {}", report.expanded_lessons);
    println!("  with story content: {}", report.lessons_with_content);
    println!("  completed: {}", report.completed_lessons);
    println!("Videos attached: {}", report.videos);

    if report.is_healthy() {
        println!("✓ No structural issues found");
    } else {
        println!("✗ {} issues:", report.issues.len());
        for issue in &report.issues {
            println!("  - {}", issue);
        }
    }
}

fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let args: Vec<String> = env::args().skip(1).collect();
    let fix = args.iter().any(|arg| arg == "--fix");
    let requested: Vec<&String> = args.iter().filter(|arg| !arg.starts_with("--")).collect();

    println!("=== Course Audit Tool ===");
    if fix {
        println!("** FIX MODE - mismatched positions will be rewritten **");
    } else {
        println!("** READ-ONLY MODE - run with --fix to repair positions **");
    }

    let storage = StorageConfig::from_env()?;
    println!("\nCourse root: {}", storage.course_root.display());
    let records = Arc::new(JsonFileRecordStore::new(storage.data_root.clone()));
    let store = ContentStore::new(storage.course_root, records);

    let courses: Vec<String> = if requested.is_empty() {
        store.list_courses()?.into_iter().map(|course| course.id).collect()
    } else {
        requested.into_iter().cloned().collect()
    };

    if courses.is_empty() {
        println!("\nNo courses found.");
        return Ok(());
    }

    let mut unhealthy = 0;
    for course in &courses {
        if fix {
            let repaired = store.repair_positions(course)?;
            if repaired > 0 {
                println!("\n✓ Repaired {} manifests in {}", repaired, course);
            }
        }

        let report = store.audit_course(course)?;
        print_report(&report);
        if !report.is_healthy() {
            unhealthy += 1;
        }
    }

    println!("\n=== Summary ===");
    println!("Courses audited: {}", courses.len());
    println!("Courses with issues: {}", unhealthy);

    if unhealthy > 0 {
        std::process::exit(1);
    }
    Ok(())
}
