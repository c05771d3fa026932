//! End-to-end: scripted PDFs through extraction, chunking, comparison and
//! follow-up questions, with no network or OCR engine.

use std::sync::Arc;

use bookdiff_core::mock::{MockBackend, MockChat, MockOcr, MockPage, MockReply};
use bookdiff_core::{
    DocumentOutcome, PdfTextExtractor, PromptSet, PromptVariant, RecursiveCharacterSplitter,
    Session, SessionError, Speaker, Textbook,
};

fn extract_book(name: &str, extractor: &PdfTextExtractor) -> DocumentOutcome {
    let splitter = RecursiveCharacterSplitter::new(16, 4).expect("valid splitter");
    match extractor.extract(b"%PDF-1.7") {
        Ok(text) if text.trim().is_empty() => DocumentOutcome::Empty { name: name.into() },
        Ok(text) => DocumentOutcome::Extracted(Textbook::new(name, text, &splitter)),
        Err(e) => DocumentOutcome::Failed {
            name: name.into(),
            error: e.to_string(),
        },
    }
}

fn extractor(primary: MockBackend, fallback: MockBackend) -> PdfTextExtractor {
    PdfTextExtractor::new(Arc::new(primary), Arc::new(fallback), Arc::new(MockOcr::new()))
}

#[tokio::test]
async fn scanned_and_digital_books_are_compared() {
    let digital = extractor(
        MockBackend::new(
            "primary",
            vec![MockPage::text("Chapter One "), MockPage::scanned(&["Chapter Two"])],
        ),
        MockBackend::new("fallback", vec![]),
    );
    let broken_primary = extractor(
        MockBackend::new(
            "primary",
            vec![MockPage::text("lost"), MockPage::broken("bad xref")],
        ),
        MockBackend::new(
            "fallback",
            vec![MockPage::scanned(&["Lesson ", "Plants"])],
        ),
    );

    let outcomes = vec![
        extract_book("Reader.pdf", &digital),
        extract_book("Workbook.pdf", &broken_primary),
    ];

    let mut session = Session::new();
    assert_eq!(session.ingest(outcomes), 2);
    assert_eq!(session.textbooks()[0].text, "Chapter One Chapter Two");
    assert_eq!(session.textbooks()[1].text, "Lesson Plants");

    let chat = MockChat::with_sequence(vec![
        MockReply::Text("Reader.pdf covers more.".into()),
        MockReply::Echo,
    ]);
    let prompts = PromptSet::new(PromptVariant::Overview);

    let comparison = session.compare(&chat, &prompts).await.expect("comparison");
    assert_eq!(comparison, "Reader.pdf covers more.");

    let answer = session
        .ask(&chat, &prompts, 1, "Which lesson?")
        .await
        .expect("answer");
    // Echo replies carry the history length: comparison turn, then this question.
    assert!(answer.starts_with("[2] Context from Workbook.pdf:\nLesson Plants"));
    assert!(answer.ends_with("Which lesson?"));

    let speakers: Vec<Speaker> = session.transcript().entries().iter().map(|e| e.0).collect();
    assert_eq!(speakers, vec![Speaker::You, Speaker::Bot]);
}

#[tokio::test]
async fn failed_document_leaves_single_book() {
    let good = extractor(
        MockBackend::new("primary", vec![MockPage::text("Only book")]),
        MockBackend::new("fallback", vec![]),
    );
    let hopeless = extractor(
        MockBackend::unreadable("primary", "not a pdf"),
        MockBackend::unreadable("fallback", "not a pdf either"),
    );

    let outcomes = vec![extract_book("a.pdf", &good), extract_book("b.pdf", &hopeless)];
    assert!(matches!(outcomes[1], DocumentOutcome::Failed { .. }));

    let mut session = Session::new();
    session.ingest(outcomes);

    let chat = MockChat::new(MockReply::Echo);
    let err = session
        .compare(&chat, &PromptSet::default())
        .await
        .expect_err("one book is not enough");
    assert!(matches!(err, SessionError::NeedTwoTextbooks(1)));
}
