//! Fixed prompt and text pools for the preset workloads.

use rand::seq::SliceRandom;
use rand::Rng;

/// Smoke completions; picked in order by iteration.
pub const SMOKE_PROMPTS: &[&str] = &["Hello, who are you?", "What is 2+2?", "Name three colors."];

/// Load completions.
pub const LOAD_PROMPTS: &[&str] = &[
    "Explain quantum computing in simple terms.",
    "Write a short poem about artificial intelligence.",
    "What are the main differences between Python and JavaScript?",
    "Provide 5 tips for effective time management.",
    "Explain how neural networks work.",
];

/// Soak completions.
pub const SOAK_PROMPTS: &[&str] = &[
    "What are the benefits of regular exercise?",
    "How does photosynthesis work?",
    "Write a short story about a robot discovering emotions.",
    "What are some effective strategies for time management?",
    "Explain the concept of supply and demand in economics.",
    "What are the key differences between renewable and non-renewable energy sources?",
    "How do vaccines work to prevent disease?",
    "Describe the water cycle and its importance to Earth's ecosystems.",
];

/// Spike completions.
pub const SPIKE_PROMPTS: &[&str] = &[
    "Write a short poem about technology.",
    "Give me three tips for productive work.",
    "Explain how the internet works in one paragraph.",
];

/// Recovery completions; short and uniform so latencies compare.
pub const RECOVERY_PROMPTS: &[&str] = &[
    "Define artificial intelligence.",
    "Explain what cloud computing is.",
    "What is machine learning?",
];

/// Smoke embeddings; picked in order by iteration.
pub const SMOKE_TEXTS: &[&str] = &[
    "Hello world.",
    "This is a basic test.",
    "Embeddings are vector representations of text.",
];

/// Load embeddings.
pub const LOAD_TEXTS: &[&str] = &[
    "The quick brown fox jumps over the lazy dog.",
    "Machine learning models have transformed how we approach natural language processing tasks.",
    "Embedding vectors are mathematical representations of text that capture semantic meaning in a high-dimensional space.",
    "Large language models can generate human-like text, answer questions, translate languages, and write different kinds of creative content.",
    "Vector databases are specialized for storing high-dimensional vectors for efficient similarity search operations.",
];

/// Spike embeddings.
pub const SPIKE_TEXTS: &[&str] = &[
    "Artificial intelligence and machine learning are transforming industries worldwide.",
    "Neural networks enable computers to recognize patterns and make decisions.",
    "Natural language processing helps computers understand and generate human language.",
    "Computer vision systems can identify objects and interpret visual information.",
    "Reinforcement learning allows systems to learn through trial and error interactions.",
];

/// Recovery embeddings.
pub const RECOVERY_TEXTS: &[&str] = &[
    "Embedding models convert text into numerical vector representations.",
    "Vector databases enable efficient similarity search for embeddings.",
    "Semantic search uses embeddings to find conceptually similar content.",
    "Clustering algorithms group similar embeddings together.",
    "Classification systems can categorize text based on embeddings.",
];

/// Short, medium and long text pools.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TieredTexts {
    /// A few words each.
    pub short: &'static [&'static str],
    /// One sentence each.
    pub medium: &'static [&'static str],
    /// A paragraph each.
    pub long: &'static [&'static str],
}

/// Soak embeddings; the tier grows with run time.
pub const SOAK_TEXTS: TieredTexts = TieredTexts {
    short: &[
        "Artificial intelligence",
        "Machine learning",
        "Neural networks",
        "Computer vision",
        "Natural language processing",
    ],
    medium: &[
        "Artificial intelligence is transforming many industries through automation.",
        "Machine learning algorithms improve through experience without explicit programming.",
        "Neural networks use interconnected nodes to simulate brain function.",
        "Computer vision enables machines to interpret and understand visual information.",
        "Natural language processing allows computers to understand human language.",
    ],
    long: &[
        "Artificial intelligence (AI) is intelligence demonstrated by machines, unlike natural intelligence displayed by humans. AI applications include advanced web search engines, recommendation systems, human speech recognition, and self-driving cars.",
        "Machine learning is a method of data analysis that automates analytical model building. It is a branch of artificial intelligence based on the idea that systems can learn from data, identify patterns and make decisions with minimal human intervention.",
        "Neural networks are computing systems with interconnected nodes that work similar to neurons in a biological brain. Using algorithms, they can recognize hidden patterns and correlations in raw data, cluster and classify it, and continuously learn and improve over time.",
    ],
};

/// Stress embeddings; the tier grows with worker slot.
pub const STRESS_TEXTS: TieredTexts = TieredTexts {
    short: &[
        "Artificial intelligence",
        "Machine learning algorithms",
        "Neural networks",
        "Natural language processing",
        "Vector embeddings",
    ],
    medium: &[
        "Artificial intelligence is intelligence demonstrated by machines, unlike natural intelligence displayed by humans and animals.",
        "Machine learning is a field of study that gives computers the ability to learn without being explicitly programmed.",
        "Neural networks are computing systems with interconnected nodes that work similar to neurons in a biological brain.",
        "Natural language processing is a subfield of AI concerned with giving computers the ability to understand text and spoken words.",
        "Vector embeddings are mathematical representations of text that capture semantic meaning in a high-dimensional space.",
    ],
    long: &[
        "Artificial intelligence (AI) is intelligence demonstrated by machines, unlike natural intelligence displayed by humans and animals, which involves consciousness and emotionality. The distinction between the former and the latter categories is often revealed by the acronym chosen. Strong AI is generally labeled as artificial general intelligence (AGI), while attempts to emulate natural intelligence have been called artificial biological intelligence (ABI).",
        "Machine learning (ML) is a field of study that gives computers the ability to learn without being explicitly programmed. ML is one way of achieving artificial intelligence. Machine learning algorithms build a model based on sample data, known as training data, in order to make predictions or decisions without being explicitly programmed to do so.",
        "Neural networks are computing systems with interconnected nodes that work similar to neurons in a biological brain. Using algorithms, they can recognize hidden patterns and correlations in raw data, cluster and classify it, and continuously learn and improve over time. Neural networks are used in deep learning, which is a subfield of machine learning.",
    ],
};

const SYNTHETIC_PREFIX: &str = "Respond to the following input with similar words for as long as you can: ";

const WORDS: &[&str] = &[
    "amber", "anchor", "arrive", "basket", "beacon", "border", "bright", "cabin", "canvas",
    "carry", "cedar", "circle", "cloud", "copper", "crisp", "delta", "drift", "eager", "echo",
    "ember", "fabric", "falcon", "field", "forge", "gentle", "glacier", "harbor", "hollow",
    "island", "jacket", "kernel", "lantern", "ledger", "linen", "marble", "meadow", "mirror",
    "narrow", "north", "orbit", "paper", "pebble", "pilot", "quiet", "rapid", "river",
    "saddle", "signal", "silver", "spoke", "stone", "summer", "thread", "timber", "tunnel",
    "velvet", "violet", "wander", "window", "winter", "yellow", "zephyr",
];

// ── Workload-shape pools ─────────────────────────────────────────────────

/// Code openings the fill-in-the-middle workload grows completions from.
pub const FIM_PREFIXES: &[&str] = &[
    "// This function",
    "# Define a class that",
    "/* A utility to",
    "def calculate_",
    "class UserProfile",
    "function fetchData",
    "-- SQL query to",
    "import tensorflow as",
];

/// A long document and the questions that can be asked about it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LongContext {
    /// Document text; `## ` headings get a request id spliced in.
    pub context: &'static str,
    /// Questions about the document.
    pub questions: &'static [&'static str],
}

/// Large inputs for the prefill-heavy workload.
pub const LONG_CONTEXTS: &[LongContext] = &[
    LongContext {
        context: "
# To Kill a Mockingbird: Study Notes

## Setting
Harper Lee's 1960 novel is set in Maycomb, Alabama, during the Great Depression. The story covers three years and is narrated by Jean Louise \"Scout\" Finch, who lives with her older brother Jem and their widowed father Atticus, a lawyer respected across the town. Much of the first half follows the children's summers with their friend Dill and their fascination with Arthur \"Boo\" Radley, a neighbor who never leaves his house and about whom the town tells many stories.

## The Trial
Atticus is appointed to defend Tom Robinson, a black man accused of assaulting Mayella Ewell, a young white woman. The evidence points strongly to Tom's innocence: Mayella's injuries were on the right side of her face, while Tom's left arm had been crippled since childhood. The all-white jury convicts him anyway. Tom is later shot while trying to escape from prison. Mayella's father, Bob Ewell, feels humiliated by the way the trial exposed him and swears revenge on Atticus.

## Resolution
On Halloween night Bob Ewell attacks Scout and Jem as they walk home from a school pageant. Jem's arm is broken in the struggle before an unknown man carries him home. Scout recognizes the man as Boo Radley. Sheriff Tate finds Ewell dead with a knife in his ribs and decides to report that Ewell fell on his own knife, sparing Boo the attention of the town.

## Themes and Reception
The novel deals with racial injustice, the loss of innocence, moral courage, social class and the coexistence of good and evil. Telling the story through a child's eyes exposes the irrationality of adult prejudice. The book won the Pulitzer Prize, was adapted into a celebrated 1962 film, has been translated into more than forty languages and remains a staple of school reading lists.
",
        questions: &[
            "What are the main themes explored in the novel?",
            "How does Atticus Finch demonstrate moral courage?",
            "What is the significance of the novel's title?",
            "How does Scout's perspective as a child shape the narrative?",
        ],
    },
    LongContext {
        context: "
# Quantum Machine Learning: A Review

## Abstract
Quantum machine learning sits where quantum computing meets statistical learning. This review surveys theoretical proposals, experimental demonstrations and open problems, and concludes that practical advantage for mainstream workloads remains out of reach on current hardware even though specific problems show promise.

## Theoretical Foundations
Many learning algorithms reduce to linear algebra. Quantum routines such as HHL promise exponential speedups for solving linear systems, but only with quantum random access memory and well-conditioned matrices. Parameterized quantum circuits act as trainable models, often called quantum neural networks, and may represent functions that classical networks approximate poorly. Quantum kernel methods evaluate feature maps on a quantum device and pass the kernel to a classical support vector machine.

## Experiments
Variational classifiers, quantum support vector machines and quantum generative adversarial networks have run on superconducting and trapped-ion processors with a handful to a few dozen qubits. Quantum annealers with thousands of qubits have trained restricted Boltzmann machines, though only for problems that fit their native formulation.

## Challenges
Loading classical data into quantum states can cost more than any speedup gained. Reading results out requires repeated measurement. Noise limits circuit depth, so error mitigation or full fault tolerance is needed. Training deep variational circuits runs into barren plateaus, where gradients vanish exponentially with system size.
",
        questions: &[
            "What are the main theoretical advantages of quantum machine learning?",
            "What must be overcome before quantum machine learning shows practical advantage?",
            "How do quantum neural networks differ from classical neural networks?",
            "Which experimental implementations have been demonstrated so far?",
        ],
    },
    LongContext {
        context: "
# Brown v. Board of Education, 347 U.S. 483 (1954)

## Facts
Five cases from Kansas, South Carolina, Virginia, Delaware and the District of Columbia were consolidated. In each, black children had been refused admission to public schools attended by white children under laws requiring or permitting segregation. The plaintiffs argued that segregation violated the Equal Protection Clause of the Fourteenth Amendment.

## Procedural History
Lower courts largely ruled for the school boards under the separate but equal doctrine of Plessy v. Ferguson. The Kansas court found segregation harmful but equal in tangible respects. The Supreme Court heard argument in 1952 and again in 1953, asking both sides to address whether the framers of the Fourteenth Amendment intended it to reach public education.

## Arguments
The plaintiffs argued that separate schools instill a sense of inferiority in black children that equal buildings and teachers cannot cure. The school boards relied on decades of precedent, on the original understanding of the amendment and on the tradition of local control of education.

## Decision
Chief Justice Earl Warren delivered a unanimous opinion holding that in public education separate facilities are inherently unequal. The Court cited psychological studies on the effect of segregation and overruled Plessy as applied to schools. A follow-up decision in 1955 ordered desegregation with all deliberate speed, a standard that allowed years of resistance.

## Significance
The ruling marked the beginning of the end of legal segregation, gave the civil rights movement its constitutional foundation and prepared the ground for the Civil Rights Act of 1964 and the Voting Rights Act of 1965.
",
        questions: &[
            "What legal doctrine did Brown v. Board of Education overturn?",
            "How did the Court's ruling rely on social science research?",
            "What was the significance of this case for American civil rights?",
            "What were the main arguments presented by both sides?",
        ],
    },
];

/// Follow-up turns appended to prefill-heavy conversations.
pub const FOLLOW_UPS: &[&str] = &[
    "Can you elaborate on that point?",
    "How does this relate to modern situations?",
    "What are the implications of this analysis?",
    "Could you provide some specific examples?",
    "What counterarguments might be made against this position?",
    "How might different perspectives view this issue?",
    "What evidence supports this conclusion?",
    "How has this understanding evolved over time?",
];

/// How long an answer a decode-heavy prompt asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerLength {
    /// A long answer.
    Long,
    /// A very long answer.
    VeryLong,
}

impl AnswerLength {
    /// `max_tokens` for this length.
    pub fn max_tokens(self) -> u64 {
        match self {
            Self::Long => 800,
            Self::VeryLong => 1500,
        }
    }
}

/// Short prompts that ask for long answers.
pub const LONG_ANSWER_PROMPTS: &[(&str, AnswerLength)] = &[
    ("Explain the entire process of photosynthesis in detail, including the light-dependent and light-independent reactions, the role of chlorophyll, and how environmental factors affect its rate.", AnswerLength::Long),
    ("Write a comprehensive explanation of how blockchain technology works, including its core components, transaction verification, consensus mechanisms, and the differences between public and private chains.", AnswerLength::VeryLong),
    ("Summarize the causes, key events and consequences of World War II across the European, Pacific and African theaters, including the political, economic and social effects on the post-war world.", AnswerLength::VeryLong),
    ("Write a comprehensive guide to starting a small business from scratch: research, planning, legal requirements, financing, marketing, hiring and operations.", AnswerLength::VeryLong),
    ("Create a step-by-step tutorial on building an image recognition model, from data collection and preprocessing to model selection, training, evaluation and deployment.", AnswerLength::VeryLong),
    ("Provide a complete guide to writing a research paper, from choosing a topic and researching it to drafting each section, citing sources and revising.", AnswerLength::VeryLong),
    ("Compare the procedural, object-oriented, functional and logic programming paradigms: core concepts, strengths, weaknesses, use cases and representative languages.", AnswerLength::Long),
    ("Compare capitalism, socialism, communism and mixed economies: theoretical foundations, historical implementations, advantages, disadvantages and modern variations.", AnswerLength::Long),
    ("Write a short story about a scientist who discovers time travel, with a description of the technology, several time periods visited, character development and a twist ending.", AnswerLength::Long),
    ("Write a five-act play about the ethics of an artificial intelligence becoming conscious, with several characters holding conflicting views, detailed dialogue and stage directions.", AnswerLength::VeryLong),
];

/// Audiences mixed into decode-heavy prompts.
pub const AUDIENCES: &[&str] = &[
    "for a university lecture",
    "for a high school student",
    "for a technical blog post",
    "for a YouTube educational video script",
    "for a presentation to non-experts",
    "for a professional conference",
    "for a science magazine article",
    "for a beginner's guide",
    "for an advanced technical audience",
    "for a children's educational program",
];

/// Angles mixed into decode-heavy prompts.
pub const ANGLES: &[&str] = &[
    "in the context of climate change",
    "with examples from recent technological developments",
    "with historical context",
    "with practical applications in mind",
    "focusing on future implications",
    "with an emphasis on ethical considerations",
    "highlighting international perspectives",
    "with case studies",
    "using analogies and metaphors",
    "from first principles",
];

/// Batch embedding inputs; consecutive windows form each batch.
pub const BATCH_TEXTS: &[&str] = &[
    "The quick brown fox jumps over the lazy dog.",
    "Machine learning models have transformed how we approach natural language processing tasks.",
    "Embedding vectors are mathematical representations of text that capture semantic meaning.",
    "Large language models can generate human-like text and answer questions.",
    "Vector databases are specialized for storing high-dimensional vectors.",
    "Artificial intelligence continues to evolve at a rapid pace.",
    "Natural language processing helps computers understand human language.",
    "Semantic search uses meaning rather than just keywords.",
    "Neural networks are inspired by biological neurons in the brain.",
    "Data science combines statistics, mathematics, and programming.",
    "Cloud computing provides scalable resources for AI workloads.",
    "Transformer models revolutionized language understanding tasks.",
    "Supervised learning requires labeled data for training.",
    "Clustering algorithms group similar data points together.",
    "Feature engineering transforms raw data into useful inputs.",
];

/// Benchmark completions.
pub const BENCHMARK_PROMPTS: &[&str] = &[
    "Explain the concept of machine learning in simple terms.",
    "What are the benefits of cloud computing for businesses?",
    "How does natural language processing work?",
    "Explain the differences between supervised and unsupervised learning.",
    "What are the ethical considerations of AI development?",
];

/// Benchmark embeddings.
pub const BENCHMARK_TEXTS: &[&str] = &[
    "Machine learning is a method of data analysis that automates analytical model building.",
    "Cloud computing is the on-demand availability of computer system resources, especially data storage and computing power.",
    "Natural language processing is a subfield of linguistics, computer science, and artificial intelligence concerned with the interactions between computers and human language.",
    "Supervised learning is the machine learning task of learning a function that maps an input to an output based on example input-output pairs.",
    "AI ethics is a set of principles and guidelines that are designed to inform the development and rightful use of artificial intelligence.",
];

/// Sentences in a synthetic stress prompt.
pub const SYNTHETIC_SENTENCES: usize = 100;
/// Words per synthetic sentence.
pub const SYNTHETIC_WORDS_PER_SENTENCE: usize = 50;

/// One random sentence of `words` words, capitalized and ending in a period.
pub fn sentence<R: Rng + ?Sized>(rng: &mut R, words: usize) -> String {
    let mut out = String::with_capacity(words * 7);
    for i in 0..words {
        let word = WORDS.choose(rng).copied().unwrap_or("word");
        if i == 0 {
            let mut chars = word.chars();
            if let Some(first) = chars.next() {
                out.extend(first.to_uppercase());
                out.push_str(chars.as_str());
            }
        } else {
            out.push(' ');
            out.push_str(word);
        }
    }
    out.push_str(". ");
    out
}

/// A long prompt that asks the model to keep generating.
pub fn synthetic_prompt<R: Rng + ?Sized>(rng: &mut R) -> String {
    let mut prompt = String::from(SYNTHETIC_PREFIX);
    for _ in 0..SYNTHETIC_SENTENCES {
        prompt.push_str(&sentence(rng, SYNTHETIC_WORDS_PER_SENTENCE));
    }
    prompt
}
