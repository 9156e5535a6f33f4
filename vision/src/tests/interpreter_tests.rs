use super::fake_page::{el, Call, FakePage};
use super::{fast_config, init_tracing, outcomes, session};
use crate::buffer::{EntryStatus, SkipCause};
use crate::command::NounKind;
use crate::console::{Console, RESUME_HINT};
use crate::dispatcher::{ActionKind, FocusTarget, SearchLevel};
use crate::errors::VisionError;
use crate::interpreter::{Event, Interpreter, OutcomeStatus, PauseReason, Prompt, RunMode, RunState};
use crate::store::{FsScriptStore, MemoryStore};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

fn buttons(names: &[&str]) -> FakePage {
    names.iter().fold(FakePage::new(), |page, name| {
        page.with(el(name, NounKind::Button).label(SearchLevel::OwnText, name))
    })
}

fn clicks(names: &[&str]) -> String {
    names
        .iter()
        .map(|n| format!("Click the '{n}' button\n"))
        .collect()
}

fn clicked(page: &FakePage) -> Vec<String> {
    page.actions()
        .into_iter()
        .filter(|(_, action)| *action == ActionKind::Click)
        .map(|(element, _)| element)
        .collect()
}

fn paused(events: &[Event]) -> Option<(Option<usize>, PauseReason)> {
    events.iter().find_map(|e| match e {
        Event::Paused { line, reason, .. } => Some((*line, *reason)),
        _ => None,
    })
}

#[tokio::test]
async fn test_scope_root_limits_nested_search() {
    let page = FakePage::new()
        .with(el("stray_user", NounKind::Textfield).label(SearchLevel::NativeLabel, "Username"))
        .with(el("login_table", NounKind::Table).label(SearchLevel::Legend, "Login"))
        .with(
            el("user", NounKind::Textfield)
                .inside("login_table")
                .label(SearchLevel::NativeLabel, "Username"),
        );
    let store = MemoryStore::new().with_script(
        "login.vision",
        "Test the \"Login\" table\n    Type \"selenium\" in the \"Username\" textfield\n",
    );
    let (mut vision, page, _) = session(page, store, true);

    vision.submit("Load test 'login.vision'").await.unwrap();
    let events = vision.submit("Run test").await.unwrap();
    assert!(outcomes(&events).iter().all(|o| o.passed()));
    assert_eq!(paused(&events), Some((None, PauseReason::EndOfScript)));

    let finds = page.finds();
    let table_finds = finds
        .iter()
        .filter(|c| matches!(c, Call::Find { kind: NounKind::Table, .. }))
        .count();
    assert_eq!(table_finds, 1);
    for call in &finds {
        if let Call::Find {
            kind: NounKind::Textfield,
            root,
            ..
        } = call
        {
            assert_eq!(root, "login_table");
        }
    }
    assert_eq!(page.actions(), vec![("user".to_string(), ActionKind::Type)]);
    // The table's label becomes a context.
    assert!(vision.contexts().contains("Login"));
}

#[tokio::test]
async fn test_second_require_is_a_no_op_in_finish_mode() {
    let store = MemoryStore::new()
        .with_script("login.vision", "Navigate 'example.test/login'\nClick the 'Sign in' button\n")
        .with_script("first.vision", "Require 'login.vision'\n")
        .with_script("second.vision", "Require 'login.vision'\n");
    let (mut vision, page, _) = session(buttons(&["Sign in"]), store, false);
    assert_eq!(vision.mode(), RunMode::Finish);

    let first = vision.run_script("first.vision").await.unwrap();
    assert!(outcomes(&first).iter().all(|o| o.passed()));
    let record = vision.requirement("login.vision").unwrap();
    assert!(record.has_run);
    assert_eq!(record.anchor_url, "https://example.test/");
    assert_eq!(clicked(&page), vec!["Sign in"]);

    page.clear_calls();
    let second = vision.run_script("second.vision").await.unwrap();
    assert!(outcomes(&second)[0].passed());
    assert_eq!(page.call_count(), 0);
    assert!(page.navigations().is_empty());
}

#[tokio::test]
async fn test_require_scope_navigates_back() {
    let page = buttons(&["Sign in"])
        .with(el("welcome", NounKind::Text).label(SearchLevel::OwnText, "Welcome"))
        .with(el("home", NounKind::Link).label(SearchLevel::OwnText, "Home"));
    let store = MemoryStore::new()
        .with_script("login.vision", "Navigate 'example.test/login'\nClick the 'Sign in' button\n")
        .with_script(
            "checkout.vision",
            "Require 'login.vision'\n    Should exist the 'Welcome' text\nClick the 'Home' link\n",
        );
    let (mut vision, page, _) = session(page, store, true);

    vision.submit("Load test 'checkout.vision'").await.unwrap();
    let events = vision.submit("Run test").await.unwrap();
    let results = outcomes(&events);
    assert!(results.iter().all(|o| o.passed()), "{results:?}");
    assert_eq!(
        page.navigations(),
        vec!["https://example.test/login", "https://example.test/"]
    );
    assert_eq!(clicked(&page), vec!["Sign in", "home"]);
    assert!(!vision.input_log().is_empty());
}

#[tokio::test]
async fn test_repeated_require_at_prompt_conflicts() {
    let store = MemoryStore::new().with_script("login.vision", "Click the 'Sign in' button\n");
    let (mut vision, page, _) = session(buttons(&["Sign in"]), store, true);

    let first = vision.submit("Require 'login.vision'").await.unwrap();
    assert!(outcomes(&first)[0].passed());
    vision.submit("End require").await.unwrap();

    let again = vision.submit("Require 'login.vision'").await.unwrap();
    match &outcomes(&again)[0].error {
        Some(VisionError::RequireConflict(path)) => assert_eq!(path, "login.vision"),
        other => panic!("Expected RequireConflict, but got {other:?}"),
    }
    assert_eq!(clicked(&page), vec!["Sign in"]);

    // The rejected scope did not stay open.
    let after = vision.submit("Click the 'Sign in' button").await.unwrap();
    assert!(outcomes(&after)[0].passed());
}

#[tokio::test]
async fn test_skip_excludes_commands_from_save() {
    let store = MemoryStore::new().with_script("four.vision", &clicks(&["a", "b", "c", "d"]));
    let (mut vision, page, store) = session(buttons(&["a", "b", "c", "d"]), store, true);

    vision.submit("Load test 'four.vision'").await.unwrap();
    vision.submit("Skip '2'").await.unwrap();
    let events = vision.submit("Run test").await.unwrap();

    let statuses: Vec<OutcomeStatus> = outcomes(&events).into_iter().map(|o| o.status).collect();
    assert_eq!(
        statuses,
        vec![
            OutcomeStatus::Skipped(SkipCause::Skip),
            OutcomeStatus::Skipped(SkipCause::Skip),
            OutcomeStatus::Passed,
            OutcomeStatus::Passed,
        ]
    );
    assert_eq!(clicked(&page), vec!["c", "d"]);

    vision.submit("Save test 'out.vision'").await.unwrap();
    assert_eq!(
        store.script("out.vision").unwrap(),
        "Click the 'c' button\nClick the 'd' button\n"
    );

    let all = vision.submit("Show all input").await.unwrap();
    match &all[0] {
        Event::Listing(lines) => {
            assert!(lines.contains(&"I Load test 'four.vision'".to_string()));
            assert!(lines.contains(&"S Click the 'a' button".to_string()));
        }
        other => panic!("Expected a listing, but got {other:?}"),
    }
}

#[tokio::test]
async fn test_skip_more_than_remain_is_rejected() {
    let store = MemoryStore::new().with_script("one.vision", &clicks(&["a"]));
    let (mut vision, _, _) = session(buttons(&["a"]), store, true);
    match vision.submit("Skip '1'").await {
        Err(VisionError::InvalidCommand(msg)) => assert!(msg.contains("No test")),
        other => panic!("Expected InvalidCommand, but got {other:?}"),
    }
    vision.submit("Load test 'one.vision'").await.unwrap();
    assert!(vision.submit("Skip '2'").await.is_err());
    let buffer = vision.active_buffer().unwrap();
    assert_eq!(buffer.entries()[0].status, EntryStatus::Pending);
}

#[tokio::test]
async fn test_is_skipped_needs_a_reason() {
    let (mut vision, page, _) = session(buttons(&["a"]), MemoryStore::new(), true);
    match vision.submit("Click the 'a' button is skipped").await {
        Err(VisionError::Parse { .. }) => {}
        other => panic!("Expected a parse error, but got {other:?}"),
    }
    assert_eq!(page.call_count(), 0);
    assert!(vision.prompt_buffer().entries().is_empty());
}

#[tokio::test]
async fn test_skipped_scope_skips_its_body_only() {
    let script = "\
Test 'later' is skipped because 'not built yet'
    Click the 'a' button
Click the 'b' button
";
    let store = MemoryStore::new().with_script("later.vision", script);
    let (mut vision, page, store) = session(buttons(&["a", "b"]), store, true);

    vision.submit("Load test 'later.vision'").await.unwrap();
    let events = vision.submit("Run test").await.unwrap();
    let results = outcomes(&events);
    let by_design = OutcomeStatus::Skipped(SkipCause::ByDesign("not built yet".into()));
    assert_eq!(results[0].status, by_design);
    assert_eq!(results[1].status, by_design);
    assert_eq!(results[2].status, OutcomeStatus::Passed);
    assert_eq!(clicked(&page), vec!["b"]);

    vision.submit("Save test").await.unwrap();
    assert_eq!(store.script("later.vision").unwrap(), script);
}

#[tokio::test]
async fn test_breakpoints_pause_and_resume() {
    let store = MemoryStore::new().with_script("abc.vision", &clicks(&["a", "b", "c"]));
    let (mut vision, page, _) = session(buttons(&["a", "b", "c"]), store, true);

    vision.submit("Load test 'abc.vision'").await.unwrap();
    vision.submit("Break '2'").await.unwrap();
    let events = vision.submit("Run test").await.unwrap();
    assert_eq!(paused(&events), Some((Some(2), PauseReason::Breakpoint)));
    assert_eq!(vision.state(), RunState::PausedAtBreakpoint);
    assert_eq!(clicked(&page), vec!["a"]);

    let listing = vision.submit("Show test").await.unwrap();
    match &listing[0] {
        Event::Listing(lines) => assert_eq!(lines[0], "B 2| Click the 'b' button"),
        other => panic!("Expected a listing, but got {other:?}"),
    }

    let events = vision.submit("Run test").await.unwrap();
    assert_eq!(paused(&events), Some((None, PauseReason::EndOfScript)));
    assert_eq!(clicked(&page), vec!["a", "b", "c"]);
    assert_eq!(vision.state(), RunState::Idle);
}

#[tokio::test]
async fn test_break_on_verb_and_next_command() {
    let script = "Navigate 'example.test'\nClick the 'a' button\nClick the 'b' button\n";
    let store = MemoryStore::new().with_script("mixed.vision", script);
    let (mut vision, page, _) = session(buttons(&["a", "b"]), store, true);

    vision.submit("Load test 'mixed.vision'").await.unwrap();
    vision.submit("Break 'click'").await.unwrap();
    let events = vision.submit("Run test").await.unwrap();
    assert_eq!(paused(&events), Some((Some(2), PauseReason::Breakpoint)));
    assert_eq!(page.navigations(), vec!["https://example.test"]);

    let step = vision.submit("Next command").await.unwrap();
    assert_eq!(outcomes(&step).len(), 1);
    assert_eq!(paused(&step), Some((Some(2), PauseReason::Step)));
    assert_eq!(clicked(&page), vec!["a"]);
    assert_eq!(vision.state(), RunState::PausedAtBreakpoint);

    // The breakpoint on line 3 is ignored when stepping.
    let step = vision.submit("Next command").await.unwrap();
    assert_eq!(paused(&step), Some((Some(3), PauseReason::Step)));
    assert_eq!(clicked(&page), vec!["a", "b"]);
}

#[tokio::test]
async fn test_interactive_error_pauses_on_the_failed_command() {
    let store = MemoryStore::new().with_script("gap.vision", &clicks(&["a", "missing", "b"]));
    let (mut vision, page, _) = session(buttons(&["a", "b"]), store, true);

    vision.submit("Load test 'gap.vision'").await.unwrap();
    let events = vision.submit("Run test").await.unwrap();
    assert_eq!(paused(&events), Some((Some(2), PauseReason::Error)));
    assert_eq!(vision.state(), RunState::PausedAtBreakpoint);
    assert_eq!(vision.active_buffer().unwrap().cursor(), 1);
    assert_eq!(clicked(&page), vec!["a"]);

    // Running again retries the same command.
    let retry = vision.submit("Run test").await.unwrap();
    let results = outcomes(&retry);
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].line, 2);
    assert!(results[0].failed());

    // Skipping it lets the run finish.
    vision.submit("Skip").await.unwrap();
    let done = vision.submit("Run test").await.unwrap();
    assert_eq!(paused(&done), Some((None, PauseReason::EndOfScript)));
    assert_eq!(clicked(&page), vec!["a", "b"]);
}

#[tokio::test]
async fn test_finish_mode_skips_everything_after_first_error() {
    let store = MemoryStore::new().with_script("gap.vision", &clicks(&["a", "missing", "b", "c"]));
    let (mut vision, page, _) = session(buttons(&["a", "b", "c"]), store, false);

    let events = vision.run_script("gap.vision").await.unwrap();
    let statuses: Vec<OutcomeStatus> = outcomes(&events).into_iter().map(|o| o.status).collect();
    assert_eq!(statuses, vec![OutcomeStatus::Passed, OutcomeStatus::Failed]);
    match events.last() {
        Some(Event::Finished(summary)) => {
            assert_eq!((summary.passed, summary.failed, summary.skipped), (1, 1, 2))
        }
        other => panic!("Expected a summary, but got {other:?}"),
    }
    assert_eq!(vision.state(), RunState::Finished);
    assert_eq!(clicked(&page), vec!["a"]);
    let buffer = vision.active_buffer().unwrap();
    assert_eq!(
        buffer.entries()[3].status,
        EntryStatus::Skipped(SkipCause::AfterError)
    );
}

#[tokio::test]
async fn test_finish_switches_mode_and_completes() {
    let store = MemoryStore::new().with_script("gap.vision", &clicks(&["a", "missing", "b"]));
    let (mut vision, page, _) = session(buttons(&["a", "b"]), store, true);

    vision.submit("Load test 'gap.vision'").await.unwrap();
    vision.submit("Break '1'").await.unwrap();
    vision.submit("Run test").await.unwrap();
    assert_eq!(vision.state(), RunState::PausedAtBreakpoint);

    let events = vision.submit("Finish").await.unwrap();
    assert_eq!(vision.mode(), RunMode::Finish);
    assert_eq!(vision.state(), RunState::Finished);
    assert!(matches!(events.last(), Some(Event::Finished(_))));
    assert_eq!(clicked(&page), vec!["a"]);
}

#[tokio::test]
async fn test_quit_closes_the_session() {
    let (mut vision, _, _) = session(buttons(&["a"]), MemoryStore::new(), true);
    let events = vision.submit("Quit").await.unwrap();
    assert!(matches!(events[..], [Event::Goodbye]));
    assert_eq!(vision.state(), RunState::Quit);
    match vision.submit("Click the 'a' button").await {
        Err(VisionError::SessionClosed) => {}
        other => panic!("Expected SessionClosed, but got {other:?}"),
    }
}

#[tokio::test]
async fn test_load_switches_to_already_loaded_buffer() {
    let store = MemoryStore::new()
        .with_script("a.vision", &clicks(&["a"]))
        .with_script("b.vision", &clicks(&["b"]));
    let (mut vision, _, store) = session(buttons(&["a", "b"]), store, true);

    vision.submit("Load test 'a.vision'").await.unwrap();
    vision.submit("Load test 'b.vision'").await.unwrap();
    vision.submit("Load test 'a.vision'").await.unwrap();
    assert_eq!(vision.active_buffer().unwrap().name(), "a.vision");
    assert_eq!(store.reads(), vec!["a.vision", "b.vision"]);
}

#[tokio::test]
async fn test_missing_file_literal_accepted() {
    let page = buttons(&["Go"]).with(
        el("upload", NounKind::FileInput).label(SearchLevel::NativeLabel, "Upload"),
    );
    let store = MemoryStore::new().with_script(
        "upload.vision",
        "Enter file <foo> in the 'Upload' file input\nClick the 'Go' button\n",
    );
    let (mut vision, page, _) = session(page, store, true);

    vision.submit("Load test 'upload.vision'").await.unwrap();
    let events = vision.submit("Run test").await.unwrap();
    match events.last() {
        Some(Event::Prompt(prompt @ Prompt::CreateOrAccept { .. })) => {
            assert!(prompt.to_string().ends_with("(C)reate or (A)ccept?"))
        }
        other => panic!("Expected the create-or-accept prompt, but got {other:?}"),
    }
    assert_eq!(vision.state(), RunState::AwaitingFileLiteralDecision);

    let events = vision.submit("A").await.unwrap();
    let results = outcomes(&events);
    match &results[0].error {
        Some(err @ VisionError::FileLiteralMissing { path, .. }) => {
            assert_eq!(path, &PathBuf::from("upload/foo"));
            assert!(err.to_string().contains("upload/foo"));
        }
        other => panic!("Expected FileLiteralMissing, but got {other:?}"),
    }
    assert!(results[1].passed());
    assert_eq!(clicked(&page), vec!["Go"]);
    assert_eq!(vision.state(), RunState::Idle);
}

#[tokio::test]
async fn test_missing_file_literal_created() {
    let page = FakePage::new().with(
        el("upload", NounKind::FileInput).label(SearchLevel::NativeLabel, "Upload"),
    );
    let store = MemoryStore::new()
        .with_script("upload.vision", "Enter file <foo> in the 'Upload' file input\n");
    let (mut vision, page, store) = session(page, store, true);

    vision.submit("Load test 'upload.vision'").await.unwrap();
    vision.submit("Run test").await.unwrap();
    let events = vision.submit("c").await.unwrap();
    assert!(matches!(events[..], [Event::Prompt(Prompt::FileLine { line: 1, .. })]));
    assert_eq!(vision.state(), RunState::AwaitingFileLiteralContent);

    vision.submit("hello").await.unwrap();
    let events = vision.submit("world").await.unwrap();
    match &events[..] {
        [Event::Prompt(prompt)] => assert_eq!(
            prompt.to_string(),
            "Line 3 of upload/foo, type <End of foo> to stop input:"
        ),
        other => panic!("Expected a line prompt, but got {other:?}"),
    }

    let events = vision.submit("<End of foo>").await.unwrap();
    assert_eq!(store.upload("foo").as_deref(), Some("hello\nworld\n"));
    assert!(outcomes(&events)[0].passed());
    match page.calls().last() {
        Some(Call::Action { action, args, .. }) => {
            assert_eq!(*action, ActionKind::EnterFile);
            assert_eq!(args.path, Some(PathBuf::from("upload/foo")));
        }
        other => panic!("Expected the file to be entered, but got {other:?}"),
    }
}

#[tokio::test]
async fn test_file_literal_created_at_breakpoint_runs_once() {
    let page = FakePage::new().with(
        el("upload", NounKind::FileInput).label(SearchLevel::NativeLabel, "Upload"),
    );
    let store = MemoryStore::new()
        .with_script("upload.vision", "Enter file <foo> in the 'Upload' file input\n");
    let (mut vision, page, _) = session(page, store, true);

    vision.submit("Load test 'upload.vision'").await.unwrap();
    vision.submit("Break '1'").await.unwrap();
    let events = vision.submit("Run test").await.unwrap();
    assert_eq!(paused(&events), Some((Some(1), PauseReason::Breakpoint)));

    let events = vision.submit("Run test").await.unwrap();
    assert!(matches!(events.last(), Some(Event::Prompt(Prompt::CreateOrAccept { .. }))));
    vision.submit("c").await.unwrap();
    let events = vision.submit("<End of foo>").await.unwrap();

    // The rerun goes past the breakpoint it already stopped on.
    assert_eq!(paused(&events), Some((None, PauseReason::EndOfScript)));
    assert!(outcomes(&events)[0].passed());
    assert_eq!(page.actions(), vec![("upload".to_string(), ActionKind::EnterFile)]);
    assert_eq!(vision.state(), RunState::Idle);
}

#[tokio::test]
async fn test_missing_file_literal_in_batch_never_prompts() {
    let page = FakePage::new().with(
        el("upload", NounKind::FileInput).label(SearchLevel::NativeLabel, "Upload"),
    );
    let store = MemoryStore::new()
        .with_script("upload.vision", "Enter file <foo> in the 'Upload' file input\n");
    let (mut vision, _, _) = session(page, store, false);

    let events = vision.run_script("upload.vision").await.unwrap();
    assert!(events.iter().all(|e| !matches!(e, Event::Prompt(_))));
    match &outcomes(&events)[0].error {
        Some(VisionError::FileLiteralMissing { name, .. }) => assert_eq!(name, "foo"),
        other => panic!("Expected FileLiteralMissing, but got {other:?}"),
    }
}

#[tokio::test]
async fn test_navigation_targets() {
    let (mut vision, page, _) = session(FakePage::new(), MemoryStore::new(), true);
    vision.submit("Navigate 'example.test/search?q=old'").await.unwrap();
    vision.submit("Navigate '?q=new'").await.unwrap();
    vision.submit("Navigate '/about'").await.unwrap();
    vision.submit("Go back").await.unwrap();
    assert_eq!(
        page.navigations(),
        vec![
            "https://example.test/search?q=old",
            "https://example.test/search?q=new",
            "https://example.test/about",
        ]
    );
    assert_eq!(page.actions(), vec![("document".to_string(), ActionKind::GoBack)]);
}

#[tokio::test]
async fn test_switch_and_close() {
    let (mut vision, page, _) = session(FakePage::new(), MemoryStore::new(), true);
    vision.submit("Switch to the 'checkout' frame").await.unwrap();
    vision.submit("Switch to the 2nd window").await.unwrap();
    vision.submit("Close the 'popup' window").await.unwrap();
    let calls = page.calls();
    assert!(calls.contains(&Call::SwitchFrame(FocusTarget::Named("checkout".into()))));
    assert!(calls.contains(&Call::SwitchWindow(FocusTarget::Index(2))));
    assert!(calls.contains(&Call::CloseWindow(FocusTarget::Named("popup".into()))));
}

#[tokio::test]
async fn test_save_preserves_nesting_from_the_prompt() {
    let page = FakePage::new()
        .with(el("login_table", NounKind::Table).label(SearchLevel::Legend, "Login"))
        .with(
            el("go", NounKind::Button)
                .inside("login_table")
                .label(SearchLevel::OwnText, "Go"),
        );
    let dir = TempDir::new().unwrap();
    init_tracing();
    let page = Arc::new(page);
    let store = Arc::new(FsScriptStore::new(dir.path(), dir.path().join("upload")));
    let mut vision = Interpreter::new(page, store, fast_config(true));

    vision.submit("Test the 'Login' table").await.unwrap();
    vision.submit("Click the 'Go' button").await.unwrap();
    vision.submit("Click the 'Nope' button").await.unwrap();
    vision.submit("End test").await.unwrap();
    vision.submit("Show input").await.unwrap();
    vision.submit("Save test 'typed.vision'").await.unwrap();

    let saved = std::fs::read_to_string(dir.path().join("typed.vision")).unwrap();
    assert_eq!(saved, "Test the 'Login' table\n    Click the 'Go' button\n");
}

#[tokio::test]
async fn test_command_typed_inside_paused_scope_saves_nested() {
    let page = FakePage::new()
        .with(el("stray_pass", NounKind::Textfield).label(SearchLevel::NativeLabel, "Password"))
        .with(el("login_table", NounKind::Table).label(SearchLevel::Legend, "Login"))
        .with(
            el("user", NounKind::Textfield)
                .inside("login_table")
                .label(SearchLevel::NativeLabel, "Username"),
        )
        .with(
            el("pass", NounKind::Textfield)
                .inside("login_table")
                .label(SearchLevel::NativeLabel, "Password"),
        )
        .with(
            el("go", NounKind::Button)
                .inside("login_table")
                .label(SearchLevel::OwnText, "Go"),
        );
    let script = "Test the 'Login' table\n    Type 'u' in the 'Username' textfield\n    Click the 'Go' button\n";
    let store = MemoryStore::new().with_script("login.vision", script);
    let (mut vision, page, store) = session(page, store, true);

    vision.submit("Load test 'login.vision'").await.unwrap();
    vision.submit("Break '3'").await.unwrap();
    let events = vision.submit("Run test").await.unwrap();
    assert_eq!(paused(&events), Some((Some(3), PauseReason::Breakpoint)));

    let typed = vision.submit("Type 'p' in the 'Password' textfield").await.unwrap();
    assert!(outcomes(&typed)[0].passed());
    vision.submit("Run test").await.unwrap();
    vision.submit("Save test 'saved.vision'").await.unwrap();
    assert_eq!(
        page.actions(),
        vec![
            ("user".to_string(), ActionKind::Type),
            ("pass".to_string(), ActionKind::Type),
            ("go".to_string(), ActionKind::Click),
        ]
    );

    let saved = store.script("saved.vision").unwrap();
    assert_eq!(
        saved,
        "Test the 'Login' table\n    Type 'u' in the 'Username' textfield\n    \
         Type 'p' in the 'Password' textfield\n    Click the 'Go' button\n"
    );

    vision.submit("Load test 'saved.vision'").await.unwrap();
    let reloaded = vision.active_buffer().unwrap();
    assert_eq!(reloaded.name(), "saved.vision");
    assert_eq!(reloaded.entries().len(), 4);
    assert!(reloaded.entries().iter().all(|entry| entry.parsed.is_ok()));
}

#[tokio::test]
async fn test_console_renders_outcomes_and_parse_failures() {
    let (vision, _, _) = session(buttons(&["Save"]), MemoryStore::new(), true);
    let mut console = Console::new(vision);
    let input = "Click the 'Save' button\nWobble\nClick the 'Nope' button\nQuit\nClick the 'Save' button\n";
    let mut output = Vec::new();
    console
        .run(tokio::io::BufReader::new(input.as_bytes()), &mut output)
        .await
        .unwrap();

    let text = String::from_utf8(output).unwrap();
    assert!(text.contains("Click the 'Save' button - ("));
    assert!(text.contains("FAILED TO PARSE"));
    assert!(text.contains("Click the 'Nope' button - FAILED"));
    assert!(text.contains("Goodbye"));
    assert!(!text.contains(RESUME_HINT));
    assert_eq!(console.interpreter().state(), RunState::Quit);
    assert_eq!(text.matches(" - (").count(), 1);
}
