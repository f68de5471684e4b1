use chrono::{DateTime, Duration, Local, NaiveDate, TimeZone, Utc};
use clap::{Parser, Subcommand};
use medilog_core::adherence::MAX_WINDOW_DAYS;
use medilog_core::reminder::MAX_HORIZON_HOURS;
use medilog_core::source::refill_doses;
use medilog_core::*;
use std::fmt::Display;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "medilog")]
#[command(about = "Medication tracking and adherence", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Config file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Override data source (local, mock)
    #[arg(long, global = true)]
    backend: Option<String>,

    /// Debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Evaluate as if it were this RFC 3339 instant (for testing)
    #[arg(long, global = true, hide = true)]
    now: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show today's doses (default)
    Today,

    /// Mark a dose as taken now
    Take {
        id: String,
        #[arg(long)]
        notes: Option<String>,
    },

    /// Mark a dose as skipped
    Skip {
        id: String,
        #[arg(long)]
        notes: Option<String>,
    },

    /// Mark a dose as missed
    Miss { id: String },

    /// Record side effects noticed after a dose
    SideEffects {
        id: String,
        #[arg(required = true)]
        effects: Vec<String>,
    },

    /// List doses, optionally filtered
    Doses {
        /// Only doses of this medication id
        #[arg(long)]
        med: Option<String>,

        /// scheduled, taken, missed or skipped
        #[arg(long)]
        status: Option<String>,

        /// First day (YYYY-MM-DD)
        #[arg(long)]
        from: Option<NaiveDate>,

        /// Last day (YYYY-MM-DD)
        #[arg(long)]
        to: Option<NaiveDate>,
    },

    /// List medication schedules
    Meds {
        /// Include stopped medications
        #[arg(long)]
        all: bool,
    },

    /// Add a medication schedule for a catalog drug
    AddMed {
        /// Drug id from `medilog drugs`
        #[arg(long)]
        drug: String,

        /// Defaults to the drug's first standard dosage
        #[arg(long)]
        dosage: Option<String>,

        /// Daily times, e.g. 08:00,20:00
        #[arg(long, value_delimiter = ',', required = true)]
        times: Vec<String>,

        /// daily, twice_daily, three_times_daily, four_times_daily, weekly, as_needed, custom
        #[arg(long, default_value = "daily")]
        frequency: String,

        /// First day (YYYY-MM-DD), defaults to today
        #[arg(long)]
        start: Option<NaiveDate>,

        /// Last day (YYYY-MM-DD)
        #[arg(long)]
        end: Option<NaiveDate>,

        #[arg(long)]
        with_food: bool,

        #[arg(long)]
        instructions: Option<String>,

        /// Disable reminders for this medication
        #[arg(long)]
        no_reminder: bool,

        /// Minutes before each dose to remind
        #[arg(long, default_value_t = 15)]
        remind_before: u32,
    },

    /// Change a medication schedule; doses already generated are kept as is
    EditMed {
        id: String,

        #[arg(long)]
        dosage: Option<String>,

        /// Daily times, e.g. 08:00,20:00
        #[arg(long, value_delimiter = ',')]
        times: Option<Vec<String>>,

        #[arg(long)]
        frequency: Option<String>,

        /// Last day (YYYY-MM-DD)
        #[arg(long)]
        end: Option<NaiveDate>,

        #[arg(long)]
        with_food: Option<bool>,

        #[arg(long)]
        instructions: Option<String>,

        /// Enable or disable reminders
        #[arg(long)]
        reminder: Option<bool>,

        #[arg(long)]
        remind_before: Option<u32>,

        /// Resume (true) or stop (false)
        #[arg(long)]
        active: Option<bool>,
    },

    /// Stop a medication (its dose history is kept)
    Stop { id: String },

    /// Search the drug reference database
    Drugs {
        #[arg(long)]
        search: Option<String>,

        #[arg(long)]
        category: Option<String>,
    },

    /// Show a drug with its concentration curve
    Drug { id: String },

    /// Add a drug to the reference database
    AddDrug {
        #[arg(long)]
        name: String,

        #[arg(long)]
        ingredient: String,

        #[arg(long)]
        category: Option<String>,

        #[arg(long)]
        description: Option<String>,

        /// Standard dosage, repeatable
        #[arg(long = "dosage")]
        dosages: Vec<String>,

        /// Hours to peak concentration
        #[arg(long)]
        tmax: Option<f64>,

        /// Elimination half-life in hours
        #[arg(long)]
        half_life: Option<f64>,
    },

    /// Change a drug in the reference database
    EditDrug {
        id: String,

        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        ingredient: Option<String>,

        #[arg(long)]
        category: Option<String>,

        #[arg(long)]
        description: Option<String>,

        /// Standard dosage, repeatable; replaces the current list
        #[arg(long = "dosage")]
        dosages: Option<Vec<String>>,

        #[arg(long)]
        tmax: Option<f64>,

        #[arg(long)]
        half_life: Option<f64>,
    },

    /// Remove a drug no medication uses
    DeleteDrug { id: String },

    /// Adherence statistics
    Progress {
        /// Window length in days (defaults to config)
        #[arg(
            long,
            value_parser = clap::value_parser!(u32).range(1..=i64::from(MAX_WINDOW_DAYS))
        )]
        days: Option<u32>,
    },

    /// Reminders due in the coming hours
    Reminders {
        #[arg(
            long,
            value_parser = clap::value_parser!(u32).range(1..=i64::from(MAX_HORIZON_HOURS))
        )]
        hours: Option<u32>,
    },

    /// Export the dose history as CSV
    Export {
        /// Output file (defaults to <data-dir>/doses.csv)
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Drop superseded records from the dose journal
    Compact,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        medilog_core::logging::init_with_level("debug");
    } else {
        medilog_core::logging::init();
    }

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Some(dir) = &cli.data_dir {
        config.data.data_dir = dir.clone();
    }
    if let Some(backend) = &cli.backend {
        config.data.backend = backend.parse()?;
    }

    let now = match &cli.now {
        Some(s) => DateTime::parse_from_rfc3339(s)
            .map_err(|e| Error::Config(format!("invalid --now {:?}: {}", s, e)))?
            .with_timezone(&Utc),
        None => Utc::now(),
    };

    let command = cli.command.unwrap_or(Commands::Today);
    match config.time.fixed_offset()? {
        Some(offset) => run(command, &config, now, &offset),
        None => run(command, &config, now, &Local),
    }
}

fn run<Tz>(command: Commands, config: &Config, now: DateTime<Utc>, tz: &Tz) -> Result<()>
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    if let Commands::Compact = command {
        return cmd_compact(config);
    }

    let mut source = open_source(config, now, tz)?;
    let source = source.as_mut();

    match command {
        Commands::Today => cmd_today(source, config, now, tz),
        Commands::Take { id, notes } => {
            let dose = source.mark_dose_taken(&id, notes, now)?;
            println!("✓ {} {} marked as taken", dose.drug_name, dose.dosage);
            Ok(())
        }
        Commands::Skip { id, notes } => {
            let dose = source.mark_dose_skipped(&id, notes)?;
            println!("✓ {} {} marked as skipped", dose.drug_name, dose.dosage);
            Ok(())
        }
        Commands::Miss { id } => {
            let dose = source.mark_dose_missed(&id)?;
            println!("✓ {} {} marked as missed", dose.drug_name, dose.dosage);
            Ok(())
        }
        Commands::SideEffects { id, effects } => {
            let dose = source.report_side_effects(&id, effects)?;
            println!(
                "✓ {} {}: side effects {}",
                dose.drug_name,
                dose.dosage,
                dose.side_effects_reported.join(", ")
            );
            Ok(())
        }
        Commands::Doses {
            med,
            status,
            from,
            to,
        } => {
            let filter = DoseFilter {
                medication_id: med,
                status: status.map(|s| s.parse()).transpose()?,
                from,
                to,
            };
            cmd_doses(source, &filter, tz)
        }
        Commands::Meds { all } => cmd_meds(source, all),
        Commands::AddMed {
            drug,
            dosage,
            times,
            frequency,
            start,
            end,
            with_food,
            instructions,
            no_reminder,
            remind_before,
        } => {
            let drug = source.drug(&drug)?;
            let dosage = match dosage.or_else(|| drug.standard_dosages.first().cloned()) {
                Some(d) => d,
                None => {
                    return Err(Error::Validation(format!(
                        "drug {} has no standard dosage, pass --dosage",
                        drug.id
                    )))
                }
            };
            let today = now.with_timezone(tz).date_naive();

            let schedule = MedicationSchedule {
                id: uuid::Uuid::new_v4().to_string(),
                drug_id: drug.id.clone(),
                drug_name: drug.name.clone(),
                dosage,
                dosage_form: drug.dosage_forms.first().copied().unwrap_or(DosageForm::Tablet),
                frequency: frequency.parse()?,
                custom_frequency: None,
                specific_times: times,
                start_date: start.unwrap_or(today),
                end_date: end,
                with_food,
                special_instructions: instructions,
                reminder_enabled: !no_reminder,
                reminder_minutes_before: remind_before,
                active: true,
            };

            let id = schedule.id.clone();
            let days = config.schedule.materialize_days;
            let doses = register_medication(source, schedule, tz, today, days)?;

            println!("✓ Added {} ({})", drug.name, id);
            println!("  {} doses scheduled over the next {} days", doses.len(), days);
            Ok(())
        }
        Commands::EditMed {
            id,
            dosage,
            times,
            frequency,
            end,
            with_food,
            instructions,
            reminder,
            remind_before,
            active,
        } => {
            let update = MedicationUpdate {
                dosage,
                frequency: frequency.map(|f| f.parse()).transpose()?,
                specific_times: times,
                end_date: end,
                with_food,
                special_instructions: instructions,
                reminder_enabled: reminder,
                reminder_minutes_before: remind_before,
                active,
            };
            if update.is_empty() {
                return Err(Error::Validation("nothing to change".into()));
            }
            let schedule = source.update_medication(&id, &update)?;
            println!("✓ Updated {} {}", schedule.drug_name, schedule.dosage);
            Ok(())
        }
        Commands::Stop { id } => {
            let schedule = source.set_medication_active(&id, false)?;
            println!("✓ Stopped {} {}", schedule.drug_name, schedule.dosage);
            Ok(())
        }
        Commands::Drugs { search, category } => {
            let drugs = source.search_drugs(search.as_deref(), category.as_deref())?;
            if drugs.is_empty() {
                println!("No matching drugs.");
            }
            for drug in drugs {
                println!(
                    "  {:<6} {} ({}) - {}",
                    drug.id,
                    drug.name,
                    drug.active_ingredient,
                    drug.category.as_deref().unwrap_or("uncategorized")
                );
            }
            Ok(())
        }
        Commands::Drug { id } => cmd_drug(source, &id),
        Commands::AddDrug {
            name,
            ingredient,
            category,
            description,
            dosages,
            tmax,
            half_life,
        } => {
            let mut drug = Drug::new(name, ingredient);
            drug.category = category;
            drug.description = description;
            drug.standard_dosages = dosages;
            if tmax.is_some() || half_life.is_some() {
                drug.pharmacokinetics = Some(Pharmacokinetics {
                    peak_concentration_time: tmax,
                    half_life,
                    ..Default::default()
                });
            }

            let id = drug.id.clone();
            let name = drug.name.clone();
            source.add_drug(drug)?;
            println!("✓ Added drug {} ({})", name, id);
            Ok(())
        }
        Commands::EditDrug {
            id,
            name,
            ingredient,
            category,
            description,
            dosages,
            tmax,
            half_life,
        } => {
            let update = DrugUpdate {
                name,
                active_ingredient: ingredient,
                description,
                category,
                standard_dosages: dosages,
                peak_concentration_time: tmax,
                half_life,
            };
            if update.is_empty() {
                return Err(Error::Validation("nothing to change".into()));
            }
            let drug = source.update_drug(&id, &update)?;
            println!("✓ Updated drug {} ({})", drug.name, drug.id);
            Ok(())
        }
        Commands::DeleteDrug { id } => {
            let drug = source.delete_drug(&id)?;
            println!("✓ Deleted drug {} ({})", drug.name, drug.id);
            Ok(())
        }
        Commands::Progress { days } => {
            let days = days.unwrap_or(config.progress.window_days);
            cmd_progress(source, now, tz, days)
        }
        Commands::Reminders { hours } => {
            let hours = hours.unwrap_or(config.reminders.horizon_hours);
            cmd_reminders(source, config, now, tz, hours)
        }
        Commands::Export { out } => {
            let path = out.unwrap_or_else(|| config.data.data_dir.join("doses.csv"));
            let count = export_doses_csv(&source.doses()?, &path)?;
            println!("✓ Exported {} doses", count);
            println!("  CSV: {}", path.display());
            Ok(())
        }
        Commands::Compact => cmd_compact(config),
    }
}

fn local_time<Tz>(at: DateTime<Utc>, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    at.with_timezone(tz).format("%H:%M").to_string()
}

/// Display label for a dose; unknown statuses are logged and shown generically
fn presentation(dose: &DoseLog, now: DateTime<Utc>) -> Presentation {
    match classify(dose, now) {
        Ok(state) => state.presentation(),
        Err(e) => {
            tracing::warn!("Dose {}: {}", dose.id, e);
            Presentation::FALLBACK
        }
    }
}

fn cmd_today<Tz>(
    source: &mut dyn DataSource,
    config: &Config,
    now: DateTime<Utc>,
    tz: &Tz,
) -> Result<()>
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let today = now.with_timezone(tz).date_naive();
    refill_doses(source, tz, today, config.schedule.materialize_days)?;

    let view = select_today(&source.doses()?, now, tz);

    if view.today.is_empty() {
        println!("No doses scheduled for {}.", view.date);
        return Ok(());
    }

    println!("Doses for {}", view.date);
    for dose in &view.today {
        println!(
            "  {}  {:<8} {} {}  [{}]",
            local_time(dose.scheduled_time, tz),
            presentation(dose, now).label,
            dose.drug_name,
            dose.dosage,
            dose.id
        );
    }
    println!();
    println!(
        "{} upcoming, {} in history",
        view.upcoming.len(),
        view.history.len()
    );
    Ok(())
}

fn cmd_doses<Tz>(source: &mut dyn DataSource, filter: &DoseFilter, tz: &Tz) -> Result<()>
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let doses = filter_doses(&source.doses()?, filter, tz);
    if doses.is_empty() {
        println!("No matching doses.");
        return Ok(());
    }

    for dose in &doses {
        let mut line = format!(
            "  {}  {:<9} {} {}  [{}]",
            dose.scheduled_time.with_timezone(tz).format("%Y-%m-%d %H:%M"),
            dose.status.as_str(),
            dose.drug_name,
            dose.dosage,
            dose.id
        );
        if !dose.side_effects_reported.is_empty() {
            line.push_str("  side effects: ");
            line.push_str(&dose.side_effects_reported.join(", "));
        }
        println!("{}", line);
    }
    println!();
    println!("{} doses", doses.len());
    Ok(())
}

fn cmd_meds(source: &mut dyn DataSource, all: bool) -> Result<()> {
    let medications = source.medications(!all)?;
    if medications.is_empty() {
        println!("No medications.");
        return Ok(());
    }

    for med in medications {
        let mut line = format!(
            "  {}  {} {}  {}",
            med.id,
            med.drug_name,
            med.dosage,
            med.specific_times.join(", ")
        );
        if med.with_food {
            line.push_str("  (with food)");
        }
        if !med.active {
            line.push_str("  [stopped]");
        }
        println!("{}", line);
    }
    Ok(())
}

fn cmd_drug(source: &mut dyn DataSource, id: &str) -> Result<()> {
    let drug = source.drug(id)?;

    println!("{} ({})", drug.name, drug.active_ingredient);
    if let Some(category) = &drug.category {
        println!("  Category: {}", category);
    }
    if let Some(description) = &drug.description {
        println!("  {}", description);
    }
    if !drug.standard_dosages.is_empty() {
        println!("  Dosages: {}", drug.standard_dosages.join(", "));
    }
    if !drug.interactions.is_empty() {
        println!("  Interactions: {}", drug.interactions.join(", "));
    }
    if !drug.side_effects.is_empty() {
        println!("  Side effects: {}", drug.side_effects.join(", "));
    }
    for warning in &drug.warnings {
        println!("  ⚠ {}", warning);
    }

    let params = CurveParams::from_pharmacokinetics(drug.pharmacokinetics.as_ref())?;
    println!();
    println!(
        "Concentration curve (Tmax {}h, half-life {}h)",
        params.tmax(),
        params.half_life()
    );
    for sample in params.curve().filter(|s| s.time_hours.fract() == 0.0) {
        let bar = "█".repeat((sample.concentration / 5.0).round() as usize);
        println!(
            "  {:>4}  {:>5.1}%  {}",
            sample.axis_label().unwrap_or_default(),
            sample.concentration,
            bar
        );
    }
    Ok(())
}

fn cmd_progress<Tz: TimeZone>(
    source: &mut dyn DataSource,
    now: DateTime<Utc>,
    tz: &Tz,
    days: u32,
) -> Result<()> {
    let report = compute_progress(&source.doses()?, &source.medications(false)?, now, tz, days)?;
    let stats = &report.stats;

    println!("Adherence {} to {}", report.period_start, report.period_end);
    println!("  Adherence rate: {:.2}%", stats.adherence_rate);
    println!(
        "  Scheduled: {}  Taken: {}  Missed: {}  Skipped: {}",
        stats.total_doses_scheduled, stats.doses_taken, stats.doses_missed, stats.doses_skipped
    );
    println!(
        "  Current streak: {} days  Longest streak: {} days",
        stats.current_streak, stats.longest_streak
    );
    println!("  Active medications: {}", stats.total_active_medications);

    if !report.medications.is_empty() {
        println!();
        println!("By medication:");
        for med in &report.medications {
            println!(
                "  {}  {}/{} ({:.2}%)",
                med.drug_name, med.taken, med.scheduled, med.rate
            );
        }
    }
    Ok(())
}

fn cmd_reminders<Tz>(
    source: &mut dyn DataSource,
    config: &Config,
    now: DateTime<Utc>,
    tz: &Tz,
    hours: u32,
) -> Result<()>
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let today = now.with_timezone(tz).date_naive();
    refill_doses(source, tz, today, config.schedule.materialize_days)?;

    let reminders = pending_reminders(
        &source.doses()?,
        &source.medications(true)?,
        now,
        Duration::hours(i64::from(hours)),
    );

    if reminders.is_empty() {
        println!("No reminders in the next {} hours.", hours);
        return Ok(());
    }

    for reminder in reminders {
        println!(
            "  {}  {} {} at {}  [{}]",
            local_time(reminder.fire_at, tz),
            reminder.drug_name,
            reminder.dosage,
            local_time(reminder.scheduled_time, tz),
            reminder.dose_id
        );
    }
    Ok(())
}

fn cmd_compact(config: &Config) -> Result<()> {
    if config.data.backend == Backend::Mock {
        println!("Nothing to compact for the mock data source.");
        return Ok(());
    }

    let store = LocalStore::open(&config.data.data_dir)?;
    let dropped = store.compact()?;
    println!("✓ Compacted dose journal, dropped {} records", dropped);
    Ok(())
}
